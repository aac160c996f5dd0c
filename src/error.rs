/// Errors produced by the PSI protocol engine.
#[derive(Debug)]
pub enum Error {
    /// A set size or bit width that cannot be turned into a working
    /// parameter set.
    InvalidParameters(String),
    /// No batching-compatible plain modulus of at most `max_bits` bits
    /// satisfies the encoding bound.
    PlainModulusNotFound {
        /// Minimum value the plain modulus must exceed.
        min_value: u64,
        /// Largest admissible bit size.
        max_bits: usize,
    },
    /// The inputs vector does not have the declared set size.
    WrongInputCount {
        /// Declared set size.
        expected: usize,
        /// Actual vector length.
        found: usize,
    },
    /// The ciphertext batch does not have the expected block count.
    WrongCiphertextCount {
        expected: usize,
        found: usize,
    },
    /// The seed vector does not have one seed per hash function.
    WrongSeedCount {
        expected: usize,
        found: usize,
    },
    /// An input value does not fit in the declared bit width.
    InputTooWide {
        value: u64,
        input_bits: usize,
    },
    /// A cuckoo eviction chain exceeded its ceiling. Recoverable: both
    /// parties re-run seed generation and retry the round.
    CuckooFull,
    /// A sender bucket ran out of slots. Recoverable the same way.
    BucketOverflow(usize),
    /// The underlying BFV library failed.
    Fhe(fhe::Error),
    /// Modular arithmetic setup failed.
    Math(fhe_math::Error),
}

impl From<fhe::Error> for Error {
    fn from(e: fhe::Error) -> Error {
        Error::Fhe(e)
    }
}

impl From<fhe_math::Error> for Error {
    fn from(e: fhe_math::Error) -> Error {
        Error::Math(e)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidParameters(s) => write!(f, "invalid parameters: {}", s),
            Error::PlainModulusNotFound { min_value, max_bits } => write!(
                f,
                "no batching prime >= {} fits in {} bits",
                min_value, max_bits
            ),
            Error::WrongInputCount { expected, found } => {
                write!(f, "expected {} inputs, got {}", expected, found)
            }
            Error::WrongCiphertextCount { expected, found } => {
                write!(f, "expected {} ciphertexts, got {}", expected, found)
            }
            Error::WrongSeedCount { expected, found } => {
                write!(f, "expected {} seeds, got {}", expected, found)
            }
            Error::InputTooWide { value, input_bits } => {
                write!(f, "input {} does not fit in {} bits", value, input_bits)
            }
            Error::CuckooFull => write!(f, "cuckoo hashing error: eviction chain too long"),
            Error::BucketOverflow(b) => write!(f, "sender bucket {} overflowed", b),
            Error::Fhe(e) => write!(f, "BFV error: {}", e),
            Error::Math(e) => write!(f, "modular arithmetic error: {}", e),
        }
    }
}

impl std::error::Error for Error {}
