//! Scanner discovery.
//!
//! Collects include paths and macro definitions for a project from its
//! build output and from compiler queries, as described by a scanner
//! profile.

pub mod parser;
pub mod profile;
pub mod reader;

pub use parser::{ConsoleParser, GccOutputParser, GccSpecsParser, PathInfo, ScannerInfo};
pub use profile::{
    BuildOutputProvider, ConsoleParserSpec, ProfileRegistry, ProviderAction, ScannerInfoProvider,
    ScannerProfile, ScannerScope,
};
pub use reader::BuildOutputReader;
