//! URL templates with explicit placeholder substitution.

use std::fmt;

use super::period::Period;
use crate::error::{Result, SyncError};

/// Placeholders a resource URL may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
  /// Account id resolved from the identity probe.
  UserId,
  /// First day of the period (ISO date).
  Start,
  /// Last day of the period (ISO date).
  End,
  /// Same as `Start`.
  Date,
}

impl Placeholder {
  fn from_name(name: &str) -> Option<Self> {
    match name {
      "user_id" => Some(Self::UserId),
      "start" => Some(Self::Start),
      "end" => Some(Self::End),
      "date" => Some(Self::Date),
      _ => None,
    }
  }

  pub fn is_date(self) -> bool {
    matches!(self, Self::Start | Self::End | Self::Date)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Literal(String),
  Placeholder(Placeholder),
}

/// A parsed URL path template such as `/{user_id}/sleep/efficiency/date/{start}/{end}.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
  raw: String,
  segments: Vec<Segment>,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateParams<'a> {
  pub user_id: Option<&'a str>,
  pub period: Option<Period>,
}

impl UrlTemplate {
  /// Parse a template, rejecting unknown placeholders and unbalanced braces.
  pub fn parse(raw: &str) -> Result<Self> {
    let mut segments = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find('{') {
      let literal = &rest[..open];
      if literal.contains('}') {
        return Err(SyncError::Catalog(format!("unbalanced '}}' in template {}", raw)));
      }
      if !literal.is_empty() {
        segments.push(Segment::Literal(literal.to_string()));
      }

      let after = &rest[open + 1..];
      let close = after
        .find('}')
        .ok_or_else(|| SyncError::Catalog(format!("unclosed '{{' in template {}", raw)))?;
      let name = &after[..close];
      let placeholder = Placeholder::from_name(name).ok_or_else(|| {
        SyncError::Catalog(format!("unknown placeholder {{{}}} in template {}", name, raw))
      })?;
      segments.push(Segment::Placeholder(placeholder));
      rest = &after[close + 1..];
    }

    if rest.contains('}') {
      return Err(SyncError::Catalog(format!("unbalanced '}}' in template {}", raw)));
    }
    if !rest.is_empty() {
      segments.push(Segment::Literal(rest.to_string()));
    }

    Ok(Self {
      raw: raw.to_string(),
      segments,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn uses(&self, placeholder: Placeholder) -> bool {
    self
      .segments
      .iter()
      .any(|s| matches!(s, Segment::Placeholder(p) if *p == placeholder))
  }

  pub fn uses_dates(&self) -> bool {
    self
      .segments
      .iter()
      .any(|s| matches!(s, Segment::Placeholder(p) if p.is_date()))
  }

  /// Substitute every placeholder. Missing values are an error.
  pub fn render(&self, params: &TemplateParams<'_>) -> Result<String> {
    let mut out = String::with_capacity(self.raw.len() + 16);

    for segment in &self.segments {
      match segment {
        Segment::Literal(s) => out.push_str(s),
        Segment::Placeholder(Placeholder::UserId) => {
          let user_id = params.user_id.ok_or_else(|| {
            SyncError::Identity(format!("{} needs a resolved user id", self.raw))
          })?;
          out.push_str(user_id);
        }
        Segment::Placeholder(p) => {
          let period = params
            .period
            .ok_or_else(|| SyncError::Catalog(format!("{} needs a period", self.raw)))?;
          let day = match p {
            Placeholder::End => period.last_day(),
            _ => period.first_day(),
          };
          out.push_str(&day.format("%Y-%m-%d").to_string());
        }
      }
    }

    Ok(out)
  }
}

impl fmt::Display for UrlTemplate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}
