//! Error types for the bean container.

use std::fmt;

/// Bean container errors.
///
/// Covers the full taxonomy of failures surfaced during registration,
/// resolution, wiring, lifecycle execution, and property refresh.
///
/// # Examples
///
/// ```rust
/// use wirebox::BeanError;
///
/// let not_found = BeanError::NotFound("MyRepo".to_string());
/// let circular = BeanError::Circular(vec![
///     "ServiceA".to_string(),
///     "ServiceB".to_string(),
///     "ServiceA".to_string(),
/// ]);
///
/// // All errors implement Display
/// println!("Error: {}", not_found);
/// println!("Error: {}", circular);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeanError {
    /// No bean matched a required selector (includes the injection path)
    NotFound(String),
    /// More than one candidate matched and primary selection did not break the tie
    Ambiguous(String),
    /// True instantiation cycle detected (includes the wiring path)
    Circular(Vec<String>),
    /// Two non-deleted beans share the same name and type
    Duplicate(String),
    /// A mock selector structurally matched more than one bean
    DuplicateMock(String),
    /// A mock selector matched no bean
    MockTargetNotFound(String),
    /// A mock does not cover every capability exported by its target
    UnimplementedInterface(String),
    /// A condition predicate failed to evaluate
    Condition(String),
    /// Property lookup, placeholder resolution, or type conversion failed
    Property(String),
    /// A constructed value does not satisfy a declared export
    Export(String),
    /// A factory produced an invalid result or failed outright
    Factory(String),
    /// An init hook failed during wiring
    Init(String),
    /// A refresh batch was rejected; previously committed values are untouched
    Refresh(String),
    /// A staged refresh value failed its validation expression
    Validation(String),
    /// Operation attempted in the wrong container state
    State(&'static str),
}

impl fmt::Display for BeanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeanError::NotFound(what) => write!(f, "bean not found: {}", what),
            BeanError::Ambiguous(what) => write!(f, "ambiguous beans: {}", what),
            BeanError::Circular(path) => {
                write!(f, "circular dependency: {}", path.join(" -> "))
            }
            BeanError::Duplicate(what) => write!(f, "duplicate beans: {}", what),
            BeanError::DuplicateMock(what) => write!(f, "duplicate mocked beans: {}", what),
            BeanError::MockTargetNotFound(what) => write!(f, "mock target not found: {}", what),
            BeanError::UnimplementedInterface(what) => {
                write!(f, "mock does not implement interface: {}", what)
            }
            BeanError::Condition(msg) => write!(f, "condition error: {}", msg),
            BeanError::Property(msg) => write!(f, "property error: {}", msg),
            BeanError::Export(msg) => write!(f, "export not satisfied: {}", msg),
            BeanError::Factory(msg) => write!(f, "factory error: {}", msg),
            BeanError::Init(msg) => write!(f, "init error: {}", msg),
            BeanError::Refresh(msg) => write!(f, "refresh rejected: {}", msg),
            BeanError::Validation(msg) => write!(f, "validation failed: {}", msg),
            BeanError::State(msg) => write!(f, "container state error: {}", msg),
        }
    }
}

impl std::error::Error for BeanError {}

/// Result type for container operations.
pub type BeanResult<T> = Result<T, BeanError>;
