//! signal-cli daemon methods.
//!
//! Method names and parameter keys (including the hyphenated ones) are what
//! signal-cli's JSON-RPC interface expects and must not be changed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::client::RpcClient;
use crate::error::{ClientError, ValidationError};
use crate::protocol::Response;

/// Who a message or lookup is for: a phone number or a Signal username.
///
/// Exactly one must be set. Empty strings count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRef {
    /// E.164 phone number, e.g. `+15551234567`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    /// Signal username including its numeric suffix, e.g. `alice.01`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// A validated [`ContactRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Number(String),
    Username(String),
}

impl ContactRef {
    #[must_use]
    pub fn number(number: impl Into<String>) -> Self {
        Self {
            number: Some(number.into()),
            username: None,
        }
    }

    #[must_use]
    pub fn username(username: impl Into<String>) -> Self {
        Self {
            number: None,
            username: Some(username.into()),
        }
    }

    /// # Errors
    ///
    /// Returns `ValidationError::MissingContact` if neither field is set and
    /// `ValidationError::AmbiguousContact` if both are.
    pub fn validate(&self) -> Result<Recipient, ValidationError> {
        let number = self.number.as_deref().filter(|s| !s.is_empty());
        let username = self.username.as_deref().filter(|s| !s.is_empty());

        match (number, username) {
            (Some(number), None) => Ok(Recipient::Number(number.to_string())),
            (None, Some(username)) => Ok(Recipient::Username(username.to_string())),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousContact),
            (None, None) => Err(ValidationError::MissingContact),
        }
    }
}

impl Recipient {
    /// signal-cli takes recipients as single-element lists keyed by kind.
    fn to_params(&self) -> Map<String, Value> {
        let mut params = Map::new();
        match self {
            Recipient::Number(number) => params.insert("recipient".into(), json!([number])),
            Recipient::Username(username) => params.insert("username".into(), json!([username])),
        };
        params
    }
}

/// Fields to change on a contact. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub nick_given_name: Option<String>,
    #[serde(default)]
    pub nick_family_name: Option<String>,
}

/// Wire shape of `updateContact` params.
#[derive(Serialize)]
struct UpdateContactParams<'a> {
    recipient: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<&'a str>,
    #[serde(rename = "given-name", skip_serializing_if = "Option::is_none")]
    given_name: Option<&'a str>,
    #[serde(rename = "family-name", skip_serializing_if = "Option::is_none")]
    family_name: Option<&'a str>,
    #[serde(rename = "nick-given-name", skip_serializing_if = "Option::is_none")]
    nick_given_name: Option<&'a str>,
    #[serde(rename = "nick-family-name", skip_serializing_if = "Option::is_none")]
    nick_family_name: Option<&'a str>,
}

/// One entry of a `getUserStatus` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    pub is_registered: bool,
}

/// Result of the `version` method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

fn require_number(number: &str) -> Result<(), ValidationError> {
    if number.is_empty() {
        return Err(ValidationError::EmptyRecipient);
    }
    Ok(())
}

impl RpcClient {
    /// Send a text message to a contact (`send`).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for an invalid contact, before any I/O,
    /// or any error [`RpcClient::request`] returns.
    pub async fn send_message(
        &self,
        contact: &ContactRef,
        message: &str,
    ) -> Result<Response, ClientError> {
        let mut params = contact.validate()?.to_params();
        params.insert("message".into(), Value::String(message.to_string()));
        self.request("send", Some(Value::Object(params))).await
    }

    /// Look up whether a contact is registered (`getUserStatus`).
    ///
    /// The result is a list of [`UserStatus`].
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` for an invalid contact, before any I/O,
    /// or any error [`RpcClient::request`] returns.
    pub async fn get_user_status(&self, contact: &ContactRef) -> Result<Response, ClientError> {
        let params = contact.validate()?.to_params();
        self.request("getUserStatus", Some(Value::Object(params)))
            .await
    }

    /// # Errors
    ///
    /// Returns any error [`RpcClient::request`] returns.
    pub async fn list_contacts(&self) -> Result<Response, ClientError> {
        self.request("listContacts", None).await
    }

    /// Change the stored details of the contact with phone number `number`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if `number` is empty, or any error
    /// [`RpcClient::request`] returns.
    pub async fn update_contact(
        &self,
        number: &str,
        update: &ContactUpdate,
    ) -> Result<Response, ClientError> {
        require_number(number)?;
        let params = UpdateContactParams {
            recipient: number,
            name: update.name.as_deref(),
            note: update.note.as_deref(),
            given_name: update.given_name.as_deref(),
            family_name: update.family_name.as_deref(),
            nick_given_name: update.nick_given_name.as_deref(),
            nick_family_name: update.nick_family_name.as_deref(),
        };
        self.request("updateContact", Some(serde_json::to_value(params)?))
            .await
    }

    /// Remove a contact and forget its stored data.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Validation` if `number` is empty, or any error
    /// [`RpcClient::request`] returns.
    pub async fn remove_contact(&self, number: &str) -> Result<Response, ClientError> {
        require_number(number)?;
        self.request(
            "removeContact",
            Some(json!({"recipient": number, "forget": true})),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns any error [`RpcClient::request`] returns.
    pub async fn list_identities(&self) -> Result<Response, ClientError> {
        self.request("listIdentities", None).await
    }

    /// # Errors
    ///
    /// Returns any error [`RpcClient::request`] returns.
    pub async fn version(&self) -> Result<Response, ClientError> {
        self.request("version", None).await
    }
}
