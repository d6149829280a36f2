//! Console parsers that turn compiler output into scanner info.
//!
//! Two GCC-flavoured parsers are provided: one for build logs (compiler
//! invocations with `-I`, `-D` and `-U` options, plus make's directory
//! tracking) and one for the output of `gcc -E -v -dD`, which lists the
//! built-in include search path and predefined macros.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;

use crate::scanner::profile::ScannerScope;

/// Extensions of files treated as compilation units.
const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "cxx", "c++", "C", "m", "mm"];

/// Include paths and macros discovered for one compilation unit or project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PathInfo {
    /// Include paths, in first-seen order
    pub include_paths: Vec<PathBuf>,
    pub defines: BTreeMap<String, String>,
    pub undefines: BTreeSet<String>,
}

impl PathInfo {
    pub fn is_empty(&self) -> bool {
        self.include_paths.is_empty() && self.defines.is_empty() && self.undefines.is_empty()
    }

    pub fn add_include(&mut self, path: PathBuf) {
        if !self.include_paths.contains(&path) {
            self.include_paths.push(path);
        }
    }

    pub fn define(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.undefines.remove(&name);
        self.defines.insert(name, value.into());
    }

    pub fn undefine(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.defines.remove(&name);
        self.undefines.insert(name);
    }

    /// Fold `other` into this one; later definitions win.
    pub fn merge(&mut self, other: PathInfo) {
        for path in other.include_paths {
            self.add_include(path);
        }
        for (name, value) in other.defines {
            self.define(name, value);
        }
        for name in other.undefines {
            self.undefine(name);
        }
    }
}

/// Everything a scan discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScannerInfo {
    /// Project-wide paths and macros
    #[serde(flatten)]
    pub project: PathInfo,

    /// Per-file entries, collected in file scope only
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub files: BTreeMap<PathBuf, PathInfo>,
}

impl ScannerInfo {
    pub fn is_empty(&self) -> bool {
        self.project.is_empty() && self.files.is_empty()
    }

    pub fn merge(&mut self, other: ScannerInfo) {
        self.project.merge(other.project);
        for (file, info) in other.files {
            self.files.entry(file).or_default().merge(info);
        }
    }
}

/// Consumes build or tool output one line at a time.
pub trait ConsoleParser: Send {
    /// Feed one line (without its terminator). Returns true if the line
    /// contributed anything.
    fn process_line(&mut self, line: &str) -> bool;

    /// Take what was collected so far.
    fn take_info(&mut self) -> ScannerInfo;
}

/// Split a command line into arguments, honouring single and double quotes
/// and backslash escapes the way a POSIX shell would.
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => match chars.next() {
                Some(next @ ('"' | '\\' | '$' | '`')) => current.push(next),
                Some(next) => {
                    current.push('\\');
                    current.push(next);
                }
                None => current.push('\\'),
            },
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_token = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        args.push(current);
    }
    args
}

fn is_source_file(arg: &str) -> bool {
    Path::new(arg)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

/// Parser for build logs produced by make and a GCC-compatible compiler.
pub struct GccOutputParser {
    compilers: Vec<String>,
    scope: ScannerScope,
    base_dir: PathBuf,
    /// Directories make reported entering, innermost last
    dir_stack: Vec<PathBuf>,
    make_dir: Regex,
    info: ScannerInfo,
}

impl GccOutputParser {
    /// `compilers` are program names (e.g. `gcc`, `g++`) whose invocations
    /// are parsed; relative paths resolve against `base_dir` until make
    /// reports a directory change.
    pub fn new(compilers: &[String], scope: ScannerScope, base_dir: &Path) -> Result<Self> {
        let make_dir = Regex::new(r#"^\S*make(?:\[\d+\])?: (Entering|Leaving) directory [`'"](.*)['"]\s*$"#)
            .context("invalid make directory pattern")?;
        Ok(GccOutputParser {
            compilers: compilers.to_vec(),
            scope,
            base_dir: base_dir.to_path_buf(),
            dir_stack: Vec::new(),
            make_dir,
            info: ScannerInfo::default(),
        })
    }

    fn working_dir(&self) -> &Path {
        self.dir_stack.last().unwrap_or(&self.base_dir)
    }

    /// Whether `arg` names one of our compilers, allowing a path and a
    /// cross-compiler prefix (`arm-none-eabi-gcc`).
    fn is_compiler(&self, arg: &str) -> bool {
        let name = Path::new(arg)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(arg);
        let name = name.strip_suffix(".exe").unwrap_or(name);
        self.compilers.iter().any(|compiler| {
            name == compiler
                || name
                    .strip_suffix(compiler.as_str())
                    .is_some_and(|prefix| prefix.ends_with('-'))
        })
    }

    fn track_directory(&mut self, line: &str) -> bool {
        let Some(caps) = self.make_dir.captures(line) else {
            return false;
        };
        let dir = PathBuf::from(&caps[2]);
        if &caps[1] == "Entering" {
            let dir = self.working_dir().join(dir);
            self.dir_stack.push(dir);
        } else {
            self.dir_stack.pop();
        }
        true
    }

    fn parse_invocation(&mut self, args: &[String]) -> bool {
        let cwd = self.working_dir().to_path_buf();
        let mut found = PathInfo::default();
        let mut sources = Vec::new();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let (flag, inline) = match arg.get(..2) {
                Some(flag @ ("-I" | "-D" | "-U")) => (flag, &arg[2..]),
                _ => {
                    if arg == "-o" {
                        iter.next();
                    } else if !arg.starts_with('-') && is_source_file(arg) {
                        sources.push(cwd.join(arg));
                    }
                    continue;
                }
            };
            let value = if inline.is_empty() {
                match iter.next() {
                    Some(value) => value.as_str(),
                    None => continue,
                }
            } else {
                inline
            };

            match flag {
                "-I" => found.add_include(cwd.join(value)),
                "-D" => match value.split_once('=') {
                    Some((name, val)) => found.define(name, val),
                    None => found.define(value, "1"),
                },
                _ => found.undefine(value),
            }
        }

        if found.is_empty() && sources.is_empty() {
            return false;
        }
        if self.scope == ScannerScope::File {
            for source in sources {
                self.info.files.entry(source).or_default().merge(found.clone());
            }
        }
        self.info.project.merge(found);
        true
    }
}

impl ConsoleParser for GccOutputParser {
    fn process_line(&mut self, line: &str) -> bool {
        if self.track_directory(line) {
            return false;
        }

        let args = split_command_line(line);
        let Some(position) = args.iter().position(|a| self.is_compiler(a)) else {
            return false;
        };
        self.parse_invocation(&args[position + 1..])
    }

    fn take_info(&mut self) -> ScannerInfo {
        std::mem::take(&mut self.info)
    }
}

/// Parser for `gcc -E -v -dD` output: the include search list and the
/// predefined macros.
#[derive(Debug, Default)]
pub struct GccSpecsParser {
    in_search_list: bool,
    info: ScannerInfo,
}

impl GccSpecsParser {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConsoleParser for GccSpecsParser {
    fn process_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();

        if trimmed.starts_with("#include") && trimmed.ends_with("search starts here:") {
            self.in_search_list = true;
            return false;
        }
        if trimmed == "End of search list." {
            self.in_search_list = false;
            return false;
        }
        if self.in_search_list {
            // macOS marks framework directories with a suffix
            let path = trimmed.trim_end_matches(" (framework directory)");
            self.info.project.add_include(PathBuf::from(path));
            return true;
        }

        if let Some(rest) = trimmed.strip_prefix("#define ") {
            let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
            self.info.project.define(name, value);
            return true;
        }
        if let Some(name) = trimmed.strip_prefix("#undef ") {
            self.info.project.undefine(name.trim());
            return true;
        }
        false
    }

    fn take_info(&mut self) -> ScannerInfo {
        std::mem::take(&mut self.info)
    }
}
