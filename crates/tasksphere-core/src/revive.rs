use std::str::FromStr;
use std::sync::OnceLock;

use anyhow::anyhow;
use regex::Regex;
use serde_json::Value;

use crate::datetime::{
  format_iso,
  parse_iso
};

const TIMESTAMP_PATTERN: &str =
  r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}.*Z$";

/// How date-shaped strings are treated
/// when stored text is loaded.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum Revival {
  /// Every string in the tree that
  /// looks like a UTC timestamp is
  /// revived, whatever field it sits
  /// in. Plain text that happens to
  /// match is rewritten too.
  #[default]
  Blind,
  /// Leave the tree untouched; typed
  /// timestamp fields still decode.
  Disabled
}

impl FromStr for Revival {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "blind" | "on" | "true" => {
        Ok(Self::Blind)
      }
      | "off" | "disabled"
      | "false" => Ok(Self::Disabled),
      | other => Err(anyhow!(
        "invalid revival policy \
         '{other}' (expected blind or \
         off)"
      ))
    }
  }
}

fn timestamp_regex()
-> Option<&'static Regex> {
  static RE: OnceLock<Option<Regex>> =
    OnceLock::new();
  RE.get_or_init(|| {
    Regex::new(TIMESTAMP_PATTERN).ok()
  })
  .as_ref()
}

#[must_use]
pub fn looks_like_timestamp(
  s: &str
) -> bool {
  timestamp_regex()
    .is_some_and(|re| re.is_match(s))
}

/// Rewrites every timestamp-shaped
/// string in `value` to its canonical
/// stored form. Returns how many
/// strings were revived.
pub fn revive_tree(
  value: &mut Value,
  policy: Revival
) -> usize {
  if policy == Revival::Disabled {
    return 0;
  }
  revive_value(value)
}

fn revive_value(
  value: &mut Value
) -> usize {
  match value {
    | Value::String(text) => {
      if !looks_like_timestamp(text) {
        return 0;
      }
      match parse_iso(text) {
        | Some(dt) => {
          *text = format_iso(dt);
          1
        }
        | None => {
          tracing::debug!(
            text = %text,
            "timestamp-shaped string did not parse; left as text"
          );
          0
        }
      }
    }
    | Value::Array(items) => {
      items
        .iter_mut()
        .map(revive_value)
        .sum()
    }
    | Value::Object(map) => {
      map
        .values_mut()
        .map(revive_value)
        .sum()
    }
    | Value::Null
    | Value::Bool(_)
    | Value::Number(_) => 0
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::{
    Revival,
    looks_like_timestamp,
    revive_tree
  };

  #[test]
  fn pattern_matches_utc_timestamps_only()
  {
    assert!(looks_like_timestamp(
      "2025-03-01T14:30:00.000Z"
    ));
    assert!(looks_like_timestamp(
      "2025-03-01T14:30:00Z"
    ));
    assert!(!looks_like_timestamp(
      "2025-03-01T14:30:00+01:00"
    ));
    assert!(!looks_like_timestamp(
      "2025-03-01"
    ));
    assert!(!looks_like_timestamp(
      "due 2025-03-01T14:30:00Z"
    ));
  }

  #[test]
  fn revives_recursively() {
    let mut tree = json!({
      "createdAt": "2025-03-01T14:30:00Z",
      "nested": {
        "list": ["2025-03-02T08:00:00.5Z", "plain", 3]
      },
      "count": 2
    });
    let revived =
      revive_tree(&mut tree, Revival::Blind);
    assert_eq!(revived, 2);
    assert_eq!(
      tree["createdAt"],
      "2025-03-01T14:30:00.000Z"
    );
    assert_eq!(
      tree["nested"]["list"][0],
      "2025-03-02T08:00:00.500Z"
    );
    assert_eq!(
      tree["nested"]["list"][1],
      "plain"
    );
  }

  #[test]
  fn unparseable_matches_stay_text() {
    let mut tree = json!([
      "2025-03-01T14:30:00 not a date Z"
    ]);
    assert_eq!(
      revive_tree(
        &mut tree,
        Revival::Blind
      ),
      0
    );
    assert_eq!(
      tree[0],
      "2025-03-01T14:30:00 not a date Z"
    );
  }

  #[test]
  fn disabled_policy_leaves_tree_alone()
  {
    let mut tree = json!({
      "title": "2025-03-01T14:30:00Z"
    });
    assert_eq!(
      revive_tree(
        &mut tree,
        Revival::Disabled
      ),
      0
    );
    assert_eq!(
      tree["title"],
      "2025-03-01T14:30:00Z"
    );
  }

  #[test]
  fn policy_parses_from_config_text() {
    assert_eq!(
      "blind"
        .parse::<Revival>()
        .expect("parse"),
      Revival::Blind
    );
    assert_eq!(
      "OFF"
        .parse::<Revival>()
        .expect("parse"),
      Revival::Disabled
    );
    assert!(
      "sometimes"
        .parse::<Revival>()
        .is_err()
    );
  }
}
