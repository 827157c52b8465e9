//! Unified error handling for the fell-routes tools.
//!
//! Every operation in this crate funnels into one error type so the CLI can
//! report failures uniformly and library code can propagate with `?`.

use std::fmt;

/// Unified error type for fell-routes operations.
#[derive(Debug)]
pub enum RouteToolError {
    /// Reading or writing a file failed
    Io { message: String },
    /// A GPX document could not be parsed or serialized
    Gpx { message: String },
    /// The input GPX has no track points where tracks are required
    NoTracks { path: String },
    /// More waypoints than the routing limit allows
    TooManyWaypoints { count: usize, max: usize },
    /// Two consecutive waypoints are further apart than the routing limit
    LegTooLong {
        from_index: usize,
        to_index: usize,
        distance_km: f64,
        max_km: f64,
    },
    /// Downloading or parsing the hill database failed
    HillData { message: String },
    /// HTTP/API error
    Http {
        message: String,
        status_code: Option<u16>,
    },
    /// Graph cache read/write error
    Cache { message: String },
    /// Overpass download or graph construction error
    Graph { message: String },
    /// Configuration error
    Config { message: String },
}

impl fmt::Display for RouteToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteToolError::Io { message } => write!(f, "I/O error: {}", message),
            RouteToolError::Gpx { message } => write!(f, "GPX error: {}", message),
            RouteToolError::NoTracks { path } => {
                write!(f, "No tracks found in GPX file: {}", path)
            }
            RouteToolError::TooManyWaypoints { count, max } => {
                write!(f, "Too many waypoints ({} > {})", count, max)
            }
            RouteToolError::LegTooLong {
                from_index,
                to_index,
                distance_km,
                max_km,
            } => {
                write!(
                    f,
                    "Distance between waypoint {} and {} is {:.2} km, exceeding limit of {} km",
                    from_index + 1,
                    to_index + 1,
                    distance_km,
                    max_km
                )
            }
            RouteToolError::HillData { message } => {
                write!(f, "Hill database error: {}", message)
            }
            RouteToolError::Http {
                message,
                status_code,
            } => {
                if let Some(code) = status_code {
                    write!(f, "HTTP error ({}): {}", code, message)
                } else {
                    write!(f, "HTTP error: {}", message)
                }
            }
            RouteToolError::Cache { message } => write!(f, "Graph cache error: {}", message),
            RouteToolError::Graph { message } => write!(f, "Graph error: {}", message),
            RouteToolError::Config { message } => write!(f, "Configuration error: {}", message),
        }
    }
}

impl std::error::Error for RouteToolError {}

/// Result type alias for fell-routes operations.
pub type Result<T> = std::result::Result<T, RouteToolError>;

impl From<std::io::Error> for RouteToolError {
    fn from(err: std::io::Error) -> Self {
        RouteToolError::Io {
            message: err.to_string(),
        }
    }
}

impl From<quick_xml::Error> for RouteToolError {
    fn from(err: quick_xml::Error) -> Self {
        RouteToolError::Gpx {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for RouteToolError {
    fn from(err: reqwest::Error) -> Self {
        RouteToolError::Http {
            message: err.to_string(),
            status_code: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<csv::Error> for RouteToolError {
    fn from(err: csv::Error) -> Self {
        RouteToolError::HillData {
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for RouteToolError {
    fn from(err: zip::result::ZipError) -> Self {
        RouteToolError::HillData {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for RouteToolError {
    fn from(err: serde_json::Error) -> Self {
        RouteToolError::Cache {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouteToolError::TooManyWaypoints { count: 60, max: 50 };
        assert!(err.to_string().contains("60 > 50"));

        let err = RouteToolError::LegTooLong {
            from_index: 0,
            to_index: 1,
            distance_km: 25.3,
            max_km: 20.0,
        };
        assert!(err.to_string().contains("waypoint 1 and 2"));
        assert!(err.to_string().contains("25.30 km"));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.gpx");
        let err: RouteToolError = io_err.into();
        assert!(matches!(err, RouteToolError::Io { .. }));
    }
}
