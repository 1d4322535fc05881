/// Contract violations on the query path.
///
/// Coverage misses and not-yet-resident data are answered with sentinels,
/// never with an error.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ElevationError {
    InvalidResolution(f64),
    InvalidSector,
    InvalidGrid { num_lat: usize, num_lon: usize },
    BufferTooSmall { required: usize, actual: usize },
}

impl std::fmt::Display for ElevationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElevationError::InvalidResolution(r) => {
                write!(f, "target resolution must be positive and finite, got {r}")
            }
            ElevationError::InvalidSector => write!(f, "sector bounds are inverted or not finite"),
            ElevationError::InvalidGrid { num_lat, num_lon } => {
                write!(f, "grid must be at least 1x1, got {num_lat}x{num_lon}")
            }
            ElevationError::BufferTooSmall { required, actual } => {
                write!(f, "output buffer too small: required={required} actual={actual}")
            }
        }
    }
}

impl std::error::Error for ElevationError {}
