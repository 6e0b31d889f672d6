//! Facade over the interactive `perl -d` debugger: a single-flight process
//! driver plus pure parsers for its prompt-delimited output.

pub mod driver;
pub mod parse;

pub use driver::{
    DebugEvent, DriverError, LaunchSpec, PerlDriver, RunHandle, RunKind, StopReason,
};
pub use parse::{
    array_dump_len, classify_value, parse_array_dump, parse_evaluate_result, parse_hash_dump,
    parse_stack_trace, split_variable_entries, strip_scalar_indirection, FrameContext, StackFrame,
    ValueKind, VarEntry,
};
