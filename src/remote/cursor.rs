use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque position in a feed, as understood by the server.
///
/// The token is hex-encoded JSON. Clients only ever send back tokens they
/// built from items, never interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
  /// The cursor of the item published at `published_at` with `id`.
  pub fn at(published_at: i64, id: &str) -> Self {
    let json = serde_json::json!([published_at, id]).to_string();
    Self(hex::encode(json))
  }

  /// Decode the JSON value this cursor carries.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
    let bytes = hex::decode(&self.0).map_err(|e| eyre!("Malformed cursor {}: {}", self.0, e))?;
    serde_json::from_slice(&bytes).map_err(|e| eyre!("Malformed cursor {}: {}", self.0, e))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for Cursor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_cursor_decodes_position() {
    let cursor = Cursor::at(1_700_000_000, "p42");
    let (published_at, id): (i64, String) = cursor.decode().unwrap();
    assert_eq!(published_at, 1_700_000_000);
    assert_eq!(id, "p42");
  }

  #[test]
  fn test_malformed_cursor_is_rejected() {
    let cursor: Cursor = serde_json::from_str("\"not hex\"").unwrap();
    assert!(cursor.decode::<(i64, String)>().is_err());
  }
}
