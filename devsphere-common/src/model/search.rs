//! Translation of a search request into a post filter.
//!
//! Matching is literal and case-insensitive. Usernames match on substrings,
//! tags only on whole-tag equality.

use crate::{
    model::{ValidationError, post::Post},
    util::split_terms,
};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Username,
    Tags,
    All,
}

impl SearchMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Username => "username",
            SearchMode::Tags => "tags",
            SearchMode::All => "all",
        }
    }
}

impl Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "username" => Ok(SearchMode::Username),
            "tags" => Ok(SearchMode::Tags),
            "all" => Ok(SearchMode::All),
            _ => Err(ValidationError::InvalidSearchType),
        }
    }
}

/// A resolved post filter.
///
/// A post matches if its username contains `username_fragment`, or if one of its tags equals one
/// of `tags`. Both are stored lowercased.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct SearchQuery {
    username_fragment: Option<String>,
    tags: Vec<String>,
}

impl SearchQuery {
    pub fn parse(query: &str, mode: SearchMode) -> Result<Self, ValidationError> {
        if query.trim().is_empty() {
            return Err(ValidationError::MissingSearchQuery);
        }

        let lowercase_terms = || -> Vec<String> {
            split_terms(query)
                .into_iter()
                .map(|tag| tag.to_lowercase())
                .collect()
        };

        let search = match mode {
            SearchMode::Username => SearchQuery {
                username_fragment: Some(query.to_lowercase()),
                tags: Vec::new(),
            },
            SearchMode::Tags => {
                let tags = lowercase_terms();
                if tags.is_empty() {
                    return Err(ValidationError::NoSearchTags);
                }
                SearchQuery {
                    username_fragment: None,
                    tags,
                }
            }
            SearchMode::All => {
                let mut tags = lowercase_terms();
                if tags.is_empty() {
                    tags.push(query.to_lowercase());
                }
                SearchQuery {
                    username_fragment: Some(query.to_lowercase()),
                    tags,
                }
            }
        };

        Ok(search)
    }

    #[must_use]
    pub fn username_fragment(&self) -> Option<&str> {
        self.username_fragment.as_deref()
    }

    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[must_use]
    pub fn matches(&self, post: &Post) -> bool {
        let username_matches = self
            .username_fragment
            .as_deref()
            .is_some_and(|fragment| post.username.get().to_lowercase().contains(fragment));

        username_matches
            || post
                .tags
                .iter()
                .any(|tag| self.tags.contains(&tag.to_lowercase()))
    }
}
