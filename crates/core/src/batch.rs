//! Git LFS batch API wire types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use time::OffsetDateTime;

/// Transfer direction requested in a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
}

impl Operation {
    /// Parse from string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            _ => Err(crate::Error::UnknownOperation(s.to_string())),
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Git ref a batch applies to. Accepted and ignored.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GitRef {
    pub name: String,
}

/// A requested object.
///
/// Fields are kept raw so that one malformed entry produces a per-object
/// error instead of failing the whole batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub oid: String,
    #[serde(default)]
    pub size: Option<i64>,
}

/// POST body of the batch endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    pub operation: String,
    /// Transfer adapters the client supports. Absent means `["basic"]`.
    #[serde(default)]
    pub transfers: Option<Vec<String>>,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<GitRef>,
    pub objects: Vec<ObjectSpec>,
    #[serde(default)]
    pub hash_algo: Option<String>,
}

impl BatchRequest {
    /// Whether the client accepts the basic transfer adapter.
    pub fn accepts_basic(&self) -> bool {
        match &self.transfers {
            None => true,
            Some(transfers) => transfers.iter().any(|t| t == crate::BASIC_TRANSFER),
        }
    }
}

/// A transfer action: where to send the request and which headers to attach.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectAction {
    pub href: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub header: BTreeMap<String, String>,
    pub expires_in: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Actions available for an object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ObjectActions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<ObjectAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<ObjectAction>,
}

/// Per-object error descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectError {
    pub code: u16,
    pub message: String,
}

impl ObjectError {
    /// The object is absent from the repository.
    pub fn not_found() -> Self {
        Self {
            code: 404,
            message: "Object does not exist".to_string(),
        }
    }

    /// The object entry failed validation.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            code: 422,
            message: message.into(),
        }
    }
}

/// One entry of a batch response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectResponse {
    pub oid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<ObjectActions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ObjectError>,
}

impl ObjectResponse {
    /// An entry carrying a single action.
    pub fn with_action(oid: String, size: u64, operation: Operation, action: ObjectAction) -> Self {
        let actions = match operation {
            Operation::Upload => ObjectActions {
                upload: Some(action),
                download: None,
            },
            Operation::Download => ObjectActions {
                upload: None,
                download: Some(action),
            },
        };
        Self {
            oid,
            size: Some(size),
            authenticated: Some(true),
            actions: Some(actions),
            error: None,
        }
    }

    /// An entry carrying an error.
    pub fn with_error(oid: String, size: Option<u64>, error: ObjectError) -> Self {
        Self {
            oid,
            size,
            authenticated: None,
            actions: None,
            error: Some(error),
        }
    }
}

/// Batch endpoint response body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchResponse {
    pub transfer: String,
    pub objects: Vec<ObjectResponse>,
    pub hash_algo: String,
}

impl BatchResponse {
    /// A basic-transfer response over the given entries.
    pub fn basic(objects: Vec<ObjectResponse>) -> Self {
        Self {
            transfer: crate::BASIC_TRANSFER.to_string(),
            objects,
            hash_algo: "sha256".to_string(),
        }
    }
}
