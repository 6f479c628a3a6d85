use thiserror::Error;

use crate::assembly::InstructionId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! ill_formed {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        crate::Error::IllFormedPatch {
            reason: format!($fmt $(, $arg)*),
        }
    };
}

/// The kind of metadata symbol a lookup was searching for.
///
/// Carried by [`Error::SymbolNotFound`] so that the log line names exactly which
/// part of the patch target could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SymbolKind {
    /// A type definition, matched by its simple name
    #[strum(serialize = "type")]
    Type,
    /// A method definition on a resolved type
    #[strum(serialize = "method")]
    Method,
    /// A field definition on a resolved type or on a field's declared type
    #[strum(serialize = "field")]
    Field,
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The first three variants form the patch failure taxonomy: every one of them aborts the
/// current patch attempt without leaving a half-modified method body behind. The remaining
/// variants describe inconsistencies in the module or the instruction stream that was handed
/// in by the host.
///
/// # Error Categories
///
/// ## Patch Errors
/// - [`Error::SymbolNotFound`] - A type, method or field name did not resolve
/// - [`Error::PatternNotFound`] - No branch in the method matched the search pattern
/// - [`Error::IllFormedPatch`] - The patch cannot be expressed against the resolved symbols
///
/// ## Instruction Stream Errors
/// - [`Error::Malformed`] - Inconsistent body or operand (dangling handles, wrong operand kind)
/// - [`Error::InvalidInstruction`] - A handle that does not belong to the body
/// - [`Error::BranchOutOfRange`] - A short branch can no longer reach its target
///
/// # Examples
///
/// ```rust
/// use cilpatch::{Error, SymbolKind};
///
/// let err = Error::SymbolNotFound { kind: SymbolKind::Type, name: "EntityAlive".into() };
/// assert_eq!(err.to_string(), "Failed to find type 'EntityAlive'");
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A symbol lookup by exact name failed.
    ///
    /// Raised by the resolver before anything in the module has been touched.
    ///
    /// # Fields
    ///
    /// * `kind` - Which kind of symbol was searched for
    /// * `name` - The exact name that was searched for
    #[error("Failed to find {kind} '{name}'")]
    SymbolNotFound {
        /// The kind of symbol that was missing
        kind: SymbolKind,
        /// The name that did not resolve
        name: String,
    },

    /// No instruction in the method satisfied the branch search predicate.
    #[error("Failed to find the branch opcode to patch in '{method}'")]
    PatternNotFound {
        /// Name of the method that was scanned
        method: String,
    },

    /// The requested patch cannot be built against the resolved symbols.
    ///
    /// Covers static receivers, field types that cannot accept the store, missing
    /// terminal instructions and tails that would push a short branch out of range.
    #[error("Ill-formed patch: {reason}")]
    IllFormedPatch {
        /// Description of the violated requirement
        reason: String,
    },

    /// The instruction stream or module is internally inconsistent.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An instruction handle was used with a body it does not belong to.
    #[error("Instruction {0} is not part of this method body")]
    InvalidInstruction(InstructionId),

    /// A short-form branch cannot encode the distance to its target.
    ///
    /// Short branches carry a signed 8-bit displacement relative to the end of the
    /// branch instruction.
    #[error("Branch at IL_{offset:04x} cannot reach its target (distance {distance})")]
    BranchOutOfRange {
        /// IL offset of the branch instruction
        offset: u32,
        /// Displacement that would have been required
        distance: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_not_found_names_kind_and_symbol() {
        let err = Error::SymbolNotFound {
            kind: SymbolKind::Method,
            name: "Init".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to find method 'Init'");

        let err = Error::SymbolNotFound {
            kind: SymbolKind::Field,
            name: "Self".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to find field 'Self'");
    }

    #[test]
    fn malformed_macro_records_location() {
        let err = malformed_error!("bad operand {}", 3);
        match err {
            Error::Malformed {
                message,
                file,
                line,
            } => {
                assert_eq!(message, "bad operand 3");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn branch_out_of_range_formats_offset() {
        let err = Error::BranchOutOfRange {
            offset: 0x1f,
            distance: 140,
        };
        assert_eq!(
            err.to_string(),
            "Branch at IL_001f cannot reach its target (distance 140)"
        );
    }
}
