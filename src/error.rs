use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("{context}: invalid shape {shape:?}: {reason}")]
    InvalidShape {
        context: &'static str,
        shape: Vec<usize>,
        reason: String,
    },

    #[error("{context}: expected shape {expected:?}, received {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("shape {shape:?} holds {expected} elements but {actual} were supplied")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("index {index:?} is out of bounds for shape {shape:?}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Vec<usize> },

    #[error("axis {axis} is out of bounds for a tensor of rank {rank}")]
    AxisOutOfBounds { axis: usize, rank: usize },

    #[error("{context}: expected {expected} items, received {actual}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0} has not been built")]
    NotBuilt(&'static str),

    #[error("{0}: backward called without a preceding forward pass")]
    MissingForward(&'static str),

    #[error("optimizer {0} has not been constructed with parameters")]
    NotConstructed(&'static str),

    #[error("model has not been compiled")]
    NotCompiled,

    #[error("model is already compiled, structural edits are not allowed")]
    AlreadyCompiled,

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("{0}: destination shares its buffer with a source tensor")]
    AliasedBuffers(&'static str),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("worker pool failure: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn shape_mismatch(
        context: &'static str,
        expected: &[usize],
        actual: &[usize],
    ) -> Self {
        Error::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub(crate) fn invalid_shape(context: &'static str, shape: &[usize], reason: &str) -> Self {
        Error::InvalidShape {
            context,
            shape: shape.to_vec(),
            reason: reason.to_string(),
        }
    }
}

#[test]
fn test_shape_mismatch_message_names_both_shapes() {
    let err = Error::shape_mismatch("dense forward", &[3], &[4]);
    assert_eq!(
        err.to_string(),
        "dense forward: expected shape [3], received [4]"
    );
}
