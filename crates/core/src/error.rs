//! Error types for drainhand

use thiserror::Error;

/// Main error type for drainhand operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Grid of {rows}x{cols} is too small, at least 3x3 cells are required")]
    GridTooSmall { rows: usize, cols: usize },

    #[error("Grid contains no valid (non-nodata) cells")]
    AllNoData,

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("Geometry does not overlap the raster: {0}")]
    EmptyGeometry(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Malformed input: {0}")]
    Format(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Depression filling failed: {0}")]
    Conditioning(String),

    #[error("Flow routing failed: {0}")]
    Routing(String),

    #[error("Gap filling did not converge after {iterations} iterations ({remaining} cells undefined)")]
    Convergence { iterations: usize, remaining: usize },

    #[error("Insufficient memory: {required} bytes required, budget is {budget} bytes")]
    Resource { required: usize, budget: usize },

    #[error("Allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },
}

/// Coarse classification of [`Error`], used by orchestrators to pick a
/// batch policy for a failed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed, undersized or fully-nodata input; CRS mismatch
    Input,
    /// Depression filling cannot establish a drainage path
    Conditioning,
    /// Flat resolution or routing cannot produce a valid forest
    Routing,
    /// Gap filling exceeded its iteration bound
    Convergence,
    /// Grid exceeds the memory budget or allocation failed
    Resource,
}

impl ErrorKind {
    /// Resource failures may succeed again on a smaller tile; everything
    /// else is a property of the data and will fail the same way.
    pub fn is_resource(self) -> bool {
        matches!(self, ErrorKind::Resource)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::Conditioning => "conditioning",
            ErrorKind::Routing => "routing",
            ErrorKind::Convergence => "convergence",
            ErrorKind::Resource => "resource",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Conditioning(_) => ErrorKind::Conditioning,
            Error::Routing(_) => ErrorKind::Routing,
            Error::Convergence { .. } => ErrorKind::Convergence,
            Error::Resource { .. } | Error::AllocationFailed { .. } => ErrorKind::Resource,
            _ => ErrorKind::Input,
        }
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        Error::Format(format!("TIFF: {}", e))
    }
}

/// Result type alias for drainhand operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(Error::AllNoData.kind(), ErrorKind::Input);
        assert_eq!(
            Error::CrsMismatch("EPSG:4326".into(), "EPSG:3857".into()).kind(),
            ErrorKind::Input
        );
        assert_eq!(Error::Conditioning("x".into()).kind(), ErrorKind::Conditioning);
        assert_eq!(Error::Routing("x".into()).kind(), ErrorKind::Routing);
        assert_eq!(
            Error::Convergence { iterations: 3, remaining: 1 }.kind(),
            ErrorKind::Convergence
        );

        let oom = Error::Resource { required: 10, budget: 5 };
        assert!(oom.kind().is_resource());
        assert!(Error::AllocationFailed { bytes: 1 << 40 }.kind().is_resource());
        assert!(!Error::AllNoData.kind().is_resource());
    }
}
