use serde::Deserialize;

use crate::broker::topic::TopicKey;
use crate::broker::variant::{EXTERNAL, INTERNAL, VariantTag, Variants};
use crate::utils::error::{EngineError, TransportError};

/// Raw query parameters of `GET /stream`.
///
/// `variant` selects the view directly; `internal=true|false` is accepted as
/// shorthand for `variant=internal|external`.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub project: Option<String>,
    pub display_mode: Option<bool>,
    pub username: Option<String>,
    pub variant: Option<String>,
    pub internal: Option<bool>,
}

/// A validated handshake: everything needed to register the subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub topic: TopicKey,
    pub username: String,
    pub variant: VariantTag,
}

impl ConnectParams {
    pub fn validate(self, variants: &Variants) -> Result<Handshake, TransportError> {
        let username = self
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or(TransportError::MissingParameter("username"))?;

        let project = match self.project.as_deref().map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(id) if TopicKey::is_valid_project_id(id) => Some(id.to_string()),
            Some(_) => {
                return Err(TransportError::InvalidParameter {
                    name: "project",
                    reason: "expected 1-64 characters from [A-Za-z0-9_.-]".to_string(),
                });
            }
        };

        let variant = match (self.variant, self.internal) {
            (Some(tag), _) => VariantTag::new(tag.trim()),
            (None, Some(true)) => VariantTag::from(INTERNAL),
            (None, Some(false)) => VariantTag::from(EXTERNAL),
            (None, None) => return Err(TransportError::MissingParameter("variant")),
        };
        if !variants.contains(&variant) {
            return Err(EngineError::UnknownVariant(variant.to_string()).into());
        }

        Ok(Handshake {
            topic: TopicKey::new(project, self.display_mode.unwrap_or(false)),
            username,
            variant,
        })
    }
}
