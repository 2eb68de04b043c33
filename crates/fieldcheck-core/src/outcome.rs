//! Step result type for best-effort operations.

/// Result of a step that may succeed, succeed with caveats, or fail outright.
///
/// `Degraded` carries the value that was still produced along with the
/// reasons it is not the full result (fallback photo references, offline
/// hydration, a server placeholder that could not be created, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Ok(T),
    Degraded(T, Vec<String>),
    Failed(String),
}

impl<T> Outcome<T> {
    /// Build `Ok` or `Degraded` depending on whether any reasons were collected.
    pub fn from_reasons(value: T, reasons: Vec<String>) -> Self {
        if reasons.is_empty() {
            Self::Ok(value)
        } else {
            Self::Degraded(value, reasons)
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Ok(value) | Self::Degraded(value, _) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ok(value) | Self::Degraded(value, _) => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Self::Degraded(_, reasons) => reasons,
            Self::Ok(_) | Self::Failed(_) => &[],
        }
    }

    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(..))
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Ok(value) => Outcome::Ok(f(value)),
            Self::Degraded(value, reasons) => Outcome::Degraded(f(value), reasons),
            Self::Failed(reason) => Outcome::Failed(reason),
        }
    }

    /// Append further reasons, downgrading `Ok` to `Degraded` when needed.
    #[must_use]
    pub fn with_reasons(self, mut extra: Vec<String>) -> Self {
        match self {
            Self::Ok(value) => Self::from_reasons(value, extra),
            Self::Degraded(value, mut reasons) => {
                reasons.append(&mut extra);
                Self::Degraded(value, reasons)
            }
            Self::Failed(reason) => Self::Failed(reason),
        }
    }
}
