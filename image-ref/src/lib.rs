//! Container image references for software environments
//!
//! A software environment is backed by a container image living in some
//! registry. This crate parses the usual `registry/repository:tag@digest`
//! form so a malformed reference is rejected locally instead of by the
//! remote build.

use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Tag assumed by registries when a reference names neither tag nor digest
pub const DEFAULT_TAG: &str = "latest";

/// Longest `registry/repository` name a registry accepts
pub const MAX_NAME_LEN: usize = 255;
const MAX_TAG_LEN: usize = 128;

#[derive(Parser)]
#[grammar = "grammar.pest"]
struct ReferenceParser;

/// Errors related to image reference parsing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageRefError {
    #[error("Image reference is empty")]
    Empty,
    #[error("Invalid image reference '{reference}' at position {position}")]
    Parse { reference: String, position: usize },
    #[error("Image name is too long ({len} > 255 chars)")]
    NameTooLong { len: usize },
    #[error("Tag '{0}' is longer than 128 chars")]
    TagTooLong(String),
}

pub type ImageRefResult<T> = Result<T, ImageRefError>;

/// A parsed container image reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageReference {
    /// Registry host (with optional port), e.g. `public.ecr.aws`
    pub registry: Option<String>,
    /// Slash separated repository path
    pub repository: String,
    /// Explicit tag, if any
    pub tag: Option<String>,
    /// Content digest, e.g. `sha256:...`
    pub digest: Option<String>,
}

impl ImageReference {
    pub fn parse(input: &str) -> ImageRefResult<Self> {
        if input.is_empty() {
            return Err(ImageRefError::Empty);
        }

        let reference = ReferenceParser::parse(Rule::refstr, input)
            .map_err(|e| ImageRefError::Parse {
                reference: input.to_string(),
                position: match e.location {
                    pest::error::InputLocation::Pos(pos) => pos,
                    pest::error::InputLocation::Span((start, _)) => start,
                },
            })?
            .next()
            .and_then(|refstr| refstr.into_inner().next())
            .ok_or_else(|| ImageRefError::Parse {
                reference: input.to_string(),
                position: 0,
            })?;

        let mut registry = None;
        let mut repository = String::new();
        let mut tag = None;
        let mut digest = None;

        for pair in reference.into_inner() {
            match pair.as_rule() {
                Rule::name => {
                    for part in pair.into_inner() {
                        match part.as_rule() {
                            Rule::domain => registry = Some(part.as_str().to_string()),
                            Rule::path => repository = part.as_str().to_string(),
                            _ => {}
                        }
                    }
                }
                Rule::tag => tag = Some(pair.as_str().to_string()),
                Rule::digest => digest = Some(pair.as_str().to_string()),
                _ => {}
            }
        }

        let name_len = repository.len() + registry.as_ref().map_or(0, |r: &String| r.len() + 1);
        if name_len > MAX_NAME_LEN {
            return Err(ImageRefError::NameTooLong { len: name_len });
        }

        if let Some(tag) = &tag {
            if tag.len() > MAX_TAG_LEN {
                return Err(ImageRefError::TagTooLong(tag.clone()));
            }
        }

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// The tag or digest a registry resolves this reference to
    pub fn reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// Whether the reference pins content by digest
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }
}

impl FromStr for ImageReference {
    type Err = ImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageReference {
    type Error = ImageRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ImageReference> for String {
    fn from(value: ImageReference) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
