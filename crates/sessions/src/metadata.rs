//! Session metadata: the externally visible identity attached to events.
//!
//! A rotation links the new session to its predecessor through the
//! `previousSession` attribute, so consumers can walk the history without
//! keeping old metadata around.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use tm_domain::config::SessionSeed;

use crate::record::SessionRecord;

/// Attribute naming the immediately preceding session.
pub const PREVIOUS_SESSION_ATTRIBUTE: &str = "previousSession";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
}

impl SessionMeta {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: None,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.as_ref()?.get(key).map(String::as_str)
    }

    pub fn previous_session(&self) -> Option<&str> {
        self.attribute(PREVIOUS_SESSION_ATTRIBUTE)
    }

    /// Metadata described by a configured seed.  `None` when the seed has no
    /// usable id.
    pub fn from_seed(seed: &SessionSeed) -> Option<Self> {
        let id = seed.usable_id()?;
        let attributes = (!seed.attributes.is_empty()).then(|| seed.attributes.clone());
        Some(Self {
            id: id.to_owned(),
            attributes,
        })
    }
}

/// Metadata for `new_record`, linked to `previous` when there is one.
///
/// `inherited` is the metadata that belonged to the previous session; its
/// attributes are carried forward and `previousSession` is overwritten to
/// point at `previous`.  Without a predecessor the result has no attributes.
pub fn chain(
    new_record: &SessionRecord,
    previous: Option<&SessionRecord>,
    inherited: Option<&SessionMeta>,
) -> SessionMeta {
    let mut meta = SessionMeta::new(new_record.session_id.clone());

    let Some(previous) = previous else {
        return meta;
    };

    let mut attributes = inherited
        .and_then(|m| m.attributes.clone())
        .unwrap_or_default();
    attributes.insert(
        PREVIOUS_SESSION_ATTRIBUTE.to_owned(),
        previous.session_id.clone(),
    );
    meta.attributes = Some(attributes);
    meta
}
