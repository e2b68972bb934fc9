use chrono::{
  DateTime,
  Duration,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Offset,
  SecondsFormat,
  SubsecRound,
  TimeZone,
  Timelike,
  Utc
};
use chrono_tz::Tz;

const TIMEZONE_ENV_VAR: &str =
  "TASKSPHERE_TIMEZONE";
const DUE_DISPLAY_FORMAT: &str =
  "%b %-d, %-I:%M %p";
const GAP_SEARCH_MINUTES: i64 = 15;
const GAP_SEARCH_STEPS: i64 = 96;

/// Current instant truncated to
/// millisecond resolution, the
/// precision the stored text keeps.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
  Utc::now().trunc_subsecs(3)
}

/// Canonical stored form:
/// `YYYY-MM-DDTHH:MM:SS.mmmZ`.
#[must_use]
pub fn format_iso(
  dt: DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::Millis,
    true
  )
}

#[must_use]
pub fn parse_iso(
  raw: &str
) -> Option<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(raw)
    .ok()
    .map(|dt| dt.with_timezone(&Utc))
}

/// Time zone used to compose due dates
/// from wall-clock input and to show
/// timestamps back to the user.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum DisplayZone {
  #[default]
  Local,
  Named(Tz)
}

impl DisplayZone {
  /// Environment variable first, then
  /// the configured name, then the host
  /// zone.
  pub fn resolve(
    configured: Option<&str>
  ) -> Self {
    let from_env =
      std::env::var(TIMEZONE_ENV_VAR).ok();
    Self::from_sources(
      from_env.as_deref(),
      configured
    )
  }

  /// Names that fail to parse are logged
  /// and skipped.
  pub fn from_sources(
    from_env: Option<&str>,
    configured: Option<&str>
  ) -> Self {
    if let Some(raw) = from_env
      && let Some(tz) =
        parse_timezone(raw, TIMEZONE_ENV_VAR)
    {
      return Self::Named(tz);
    }

    if let Some(raw) = configured
      && let Some(tz) = parse_timezone(
        raw,
        "display.timezone"
      )
    {
      return Self::Named(tz);
    }

    Self::Local
  }

  pub fn compose(
    &self,
    date: NaiveDate,
    time: NaiveTime
  ) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match self {
      | Self::Local => {
        resolve_local(&Local, naive)
      }
      | Self::Named(tz) => {
        resolve_local(tz, naive)
      }
    }
  }

  #[must_use]
  pub fn to_local_naive(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDateTime {
    match self {
      | Self::Local => {
        dt.with_timezone(&Local)
          .naive_local()
      }
      | Self::Named(tz) => {
        dt.with_timezone(tz)
          .naive_local()
      }
    }
  }

  /// `Mar 1, 2:30 PM`
  #[must_use]
  pub fn format_due(
    &self,
    dt: DateTime<Utc>
  ) -> String {
    self
      .to_local_naive(dt)
      .format(DUE_DISPLAY_FORMAT)
      .to_string()
  }

  #[must_use]
  pub fn format_timestamp(
    &self,
    dt: DateTime<Utc>
  ) -> String {
    self
      .to_local_naive(dt)
      .format("%Y-%m-%d %H:%M")
      .to_string()
  }
}

/// Parses the two halves of a due date
/// as entered by the user. Blank halves
/// yield `None`; so does a half that
/// does not parse.
pub fn parse_due_parts(
  date: &str,
  time: &str
) -> Option<(NaiveDate, NaiveTime)> {
  let date = date.trim();
  let time = time.trim();
  if date.is_empty() || time.is_empty()
  {
    return None;
  }

  let parsed_date =
    match NaiveDate::parse_from_str(
      date, "%Y-%m-%d"
    ) {
      | Ok(value) => value,
      | Err(err) => {
        tracing::warn!(
          date,
          error = %err,
          "ignoring unparseable due date"
        );
        return None;
      }
    };

  // Seconds are accepted but dropped;
  // due dates keep minute precision.
  let parsed_time =
    match NaiveTime::parse_from_str(
      time, "%H:%M"
    )
    .or_else(|_| {
      NaiveTime::parse_from_str(
        time, "%H:%M:%S"
      )
    }) {
      | Ok(value) => value,
      | Err(err) => {
        tracing::warn!(
          time,
          error = %err,
          "ignoring unparseable due time"
        );
        return None;
      }
    };

  let parsed_time = NaiveTime::from_hms_opt(
    parsed_time.hour(),
    parsed_time.minute(),
    0
  )?;

  Some((parsed_date, parsed_time))
}

fn resolve_local<Z: TimeZone>(
  zone: &Z,
  naive: NaiveDateTime
) -> Option<DateTime<Utc>> {
  match zone.from_local_datetime(&naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        local = %naive,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Some(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      // Wall clock skipped ahead here; read
      // the time with the offset in force
      // just before the jump.
      let before = (1..=GAP_SEARCH_STEPS)
        .map(|step| {
          naive
            - Duration::minutes(
              GAP_SEARCH_MINUTES * step
            )
        })
        .find_map(|earlier| {
          zone
            .from_local_datetime(&earlier)
            .earliest()
        })?;
      let offset = before.offset().fix();
      let utc = naive
        - Duration::seconds(i64::from(
          offset.local_minus_utc()
        ));
      tracing::debug!(
        local = %naive,
        offset = %offset,
        "local datetime falls in a gap; using prior offset"
      );
      Some(Utc.from_utc_datetime(&utc))
    }
  }
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

pub mod iso_date_serde {
  use chrono::{
    DateTime,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_iso(*dt)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_iso(&raw).ok_or_else(
      || {
        serde::de::Error::custom(
          format!(
            "invalid timestamp: {raw}"
          )
        )
      }
    )
  }

  pub mod option {
    use chrono::{
      DateTime,
      Utc
    };
    use serde::{
      Deserialize,
      Deserializer,
      Serializer
    };

    pub fn serialize<S>(
      dt: &Option<DateTime<Utc>>,
      serializer: S
    ) -> Result<S::Ok, S::Error>
    where
      S: Serializer
    {
      match dt {
        | Some(value) => {
          super::serialize(
            value, serializer
          )
        }
        | None => {
          serializer.serialize_none()
        }
      }
    }

    pub fn deserialize<'de, D>(
      deserializer: D
    ) -> Result<
      Option<DateTime<Utc>>,
      D::Error
    >
    where
      D: Deserializer<'de>
    {
      let opt =
        Option::<String>::deserialize(
          deserializer
        )?;
      match opt {
        | Some(raw) => {
          super::super::parse_iso(&raw)
            .map(Some)
            .ok_or_else(|| {
              serde::de::Error::custom(
                format!(
                  "invalid timestamp: \
                   {raw}"
                )
              )
            })
        }
        | None => Ok(None)
      }
    }
  }
}
