use crate::model::SessionId;

/// Discriminated failure for every engine operation. The `Display` text is
/// the human-readable reason string the request surface returns verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    // Validation: bad input, operation not attempted.
    InvalidHours { min: i64, max: i64 },
    FieldRequired(&'static str),

    // Policy rejections: caller may retry with different parameters.
    TooSoon,
    TooFar,
    RuleViolated { available: u32, required: u32 },
    NoSpotForWindow,
    ParkingFull,
    AlreadyParked,
    AlreadyExtended,
    ExtensionConflict,
    FutureDate,
    ReservationExpired,
    UsernameTaken(String),

    // Ownership / authorization: never downgraded to not-found.
    AccessDenied,
    AttendantRequired,

    // Not-found / already-terminal: idempotent no-op reports.
    NotFound(SessionId),
    NotPreorder(SessionId),
    NotActive(SessionId),
    AlreadyClosed(SessionId),
    NoActiveSession,
    UserNotFound,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidHours { min, max } => {
                write!(f, "Can only extend parking by {min}-{max} hours")
            }
            EngineError::FieldRequired(field) => write!(f, "{field} is required"),
            EngineError::TooSoon => {
                write!(f, "Reservation must be at least 24 hours in advance")
            }
            EngineError::TooFar => {
                write!(f, "Reservation cannot be more than 7 days in advance")
            }
            EngineError::RuleViolated {
                available,
                required,
            } => write!(
                f,
                "Not enough available spots for reservation: minimum {available} free, \
                 must have more than {required} spots free throughout the slot"
            ),
            EngineError::NoSpotForWindow => {
                write!(f, "No parking spots available for the requested time slot")
            }
            EngineError::ParkingFull => write!(f, "Parking is full. Try later"),
            EngineError::AlreadyParked => {
                write!(f, "You already have an active parking session")
            }
            EngineError::AlreadyExtended => write!(
                f,
                "Cannot extend again: this parking session was already extended"
            ),
            EngineError::ExtensionConflict => write!(
                f,
                "Cannot extend parking: a reservation is scheduled during the extension period"
            ),
            EngineError::FutureDate => write!(f, "Reservation is for a future date"),
            EngineError::ReservationExpired => write!(f, "Reservation expired"),
            EngineError::UsernameTaken(name) => {
                write!(f, "Username '{name}' already exists")
            }
            EngineError::AccessDenied => write!(
                f,
                "Access denied: this session does not belong to your account"
            ),
            EngineError::AttendantRequired => {
                write!(f, "Only parking attendants can register new subscribers")
            }
            EngineError::NotFound(id) => write!(f, "Session {id} not found"),
            EngineError::NotPreorder(id) => {
                write!(f, "Session {id} is not a preorder reservation")
            }
            EngineError::NotActive(id) => write!(f, "Session {id} is not active"),
            EngineError::AlreadyClosed(id) => {
                write!(f, "Session {id} not found or already cancelled/finished")
            }
            EngineError::NoActiveSession => write!(f, "No active parking session found"),
            EngineError::UserNotFound => write!(f, "User not found"),
        }
    }
}

impl std::error::Error for EngineError {}
