// DBGp Client - Remote Script Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::{
    fmt::Display,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a breakpoint description is rejected before anything reaches the engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BreakpointError {
    /// The description was empty.
    #[error("empty breakpoint description")]
    Empty,
    /// Neither `file:line` nor `function()` form.
    #[error("invalid breakpoint format, expected <file>:<line> or <function>(): {0}")]
    Malformed(String),
    /// Line numbers are 1-based.
    #[error("line numbers start at 1")]
    ZeroLine,
    /// Engines resolve breakpoint files as absolute URIs.
    #[error("breakpoint file must be an absolute path: {0}")]
    RelativePath(PathBuf),
    /// Function breakpoints need a name.
    #[error("function breakpoint without a function name")]
    EmptyFunction,
    /// Commands are NUL-terminated on the wire.
    #[error("breakpoint contains a NUL byte: {0:?}")]
    NulByte(String),
}

/// A breakpoint registered by the user.
///
/// The location identifies the breakpoint; at most one breakpoint exists per
/// location. `engine_id` is the id the engine assigned when the breakpoint was
/// last submitted and is only meaningful while that engine stays connected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Breakpoint {
    /// Where execution should be suspended.
    pub loc: BreakpointLocation,
    /// Engine-assigned id, valid only for the current connection.
    #[serde(skip)]
    pub engine_id: Option<String>,
    /// Disabled breakpoints stay registered but do not suspend execution.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.loc)?;
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        Ok(())
    }
}

impl FromStr for Breakpoint {
    type Err = BreakpointError;

    /// Parses `<file>:<line>` or `<function>()`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.parse()?))
    }
}

/// Where a breakpoint applies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BreakpointLocation {
    /// Suspend when execution reaches a line of a file.
    Line {
        /// Absolute local path of the source file.
        file: PathBuf,
        /// Line number (1-based).
        line: u32,
    },
    /// Suspend on entry into a function.
    FunctionEntry {
        /// Function name as the engine reports it.
        function: String,
    },
}

impl Display for BreakpointLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Line { file, line } => write!(f, "{}:{line}", file.display()),
            Self::FunctionEntry { function } => write!(f, "{function}()"),
        }
    }
}

impl FromStr for BreakpointLocation {
    type Err = BreakpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BreakpointError::Empty);
        }

        if let Some(function) = trimmed.strip_suffix("()") {
            return Ok(Self::FunctionEntry { function: function.trim().to_string() });
        }

        // Split on the last colon so Windows drive letters survive.
        let (file, line) =
            trimmed.rsplit_once(':').ok_or_else(|| BreakpointError::Malformed(s.to_string()))?;
        let line = line.trim().parse::<u32>().map_err(|_| BreakpointError::Malformed(s.to_string()))?;
        if file.trim().is_empty() {
            return Err(BreakpointError::Malformed(s.to_string()));
        }

        Ok(Self::Line { file: PathBuf::from(file.trim()), line })
    }
}

impl BreakpointLocation {
    /// Creates a file/line location.
    pub fn line(file: impl Into<PathBuf>, line: u32) -> Self {
        Self::Line { file: file.into(), line }
    }

    /// Creates a function-entry location.
    pub fn function(function: impl Into<String>) -> Self {
        Self::FunctionEntry { function: function.into() }
    }

    /// The file of a line breakpoint.
    pub fn file(&self) -> Option<&Path> {
        match self {
            Self::Line { file, .. } => Some(file),
            Self::FunctionEntry { .. } => None,
        }
    }

    /// Checks the location can be submitted to an engine.
    pub fn validate(&self) -> Result<(), BreakpointError> {
        match self {
            Self::Line { file, .. } if file.as_os_str().to_string_lossy().contains('\0') => {
                Err(BreakpointError::NulByte(file.display().to_string()))
            }
            Self::Line { line: 0, .. } => Err(BreakpointError::ZeroLine),
            Self::Line { file, .. } if !file.has_root() => {
                Err(BreakpointError::RelativePath(file.clone()))
            }
            Self::Line { .. } => Ok(()),
            Self::FunctionEntry { function } if function.trim().is_empty() => {
                Err(BreakpointError::EmptyFunction)
            }
            Self::FunctionEntry { function } if function.contains('\0') => {
                Err(BreakpointError::NulByte(function.clone()))
            }
            Self::FunctionEntry { .. } => Ok(()),
        }
    }
}

impl Breakpoint {
    /// Creates an enabled breakpoint that has not been submitted yet.
    pub fn new(loc: BreakpointLocation) -> Self {
        Self { loc, engine_id: None, enabled: true }
    }

    /// Whether the breakpoint is at `file:line`.
    pub fn is_at(&self, file: &Path, line: u32) -> bool {
        matches!(&self.loc, BreakpointLocation::Line { file: f, line: l } if f == file && *l == line)
    }

    /// Checks the breakpoint can be submitted to an engine.
    pub fn validate(&self) -> Result<(), BreakpointError> {
        self.loc.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_str_line() {
        let loc = BreakpointLocation::from_str("/var/www/index.php:42").unwrap();
        assert_eq!(loc, BreakpointLocation::line("/var/www/index.php", 42));
        assert_eq!(loc.file(), Some(Path::new("/var/www/index.php")));
    }

    #[test]
    fn test_location_from_str_function() {
        let loc = BreakpointLocation::from_str("  handle_request() ").unwrap();
        assert_eq!(loc, BreakpointLocation::function("handle_request"));
        assert!(loc.file().is_none());
    }

    #[test]
    fn test_location_from_str_windows_path() {
        let loc = BreakpointLocation::from_str("C:\\site\\index.php:7").unwrap();
        assert_eq!(loc, BreakpointLocation::line("C:\\site\\index.php", 7));
    }

    #[test]
    fn test_location_from_str_invalid() {
        assert_eq!(BreakpointLocation::from_str("   "), Err(BreakpointError::Empty));
        assert!(matches!(
            BreakpointLocation::from_str("index.php"),
            Err(BreakpointError::Malformed(_))
        ));
        assert!(matches!(
            BreakpointLocation::from_str("index.php:abc"),
            Err(BreakpointError::Malformed(_))
        ));
        assert!(matches!(BreakpointLocation::from_str(":12"), Err(BreakpointError::Malformed(_))));
    }

    #[test]
    fn test_validate() {
        assert!(BreakpointLocation::line("/a.php", 1).validate().is_ok());
        assert!(BreakpointLocation::function("main").validate().is_ok());
        assert_eq!(BreakpointLocation::line("/a.php", 0).validate(), Err(BreakpointError::ZeroLine));
        assert_eq!(
            BreakpointLocation::line("a.php", 3).validate(),
            Err(BreakpointError::RelativePath(PathBuf::from("a.php")))
        );
        assert_eq!(
            BreakpointLocation::function("  ").validate(),
            Err(BreakpointError::EmptyFunction)
        );
    }

    #[test]
    fn test_validate_rejects_nul() {
        assert_eq!(
            BreakpointLocation::function("a\0b").validate(),
            Err(BreakpointError::NulByte("a\0b".to_string()))
        );
        assert!(matches!(
            BreakpointLocation::line("/srv/a\0b.php", 3).validate(),
            Err(BreakpointError::NulByte(_))
        ));
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for text in ["/srv/app.php:10", "main()"] {
            let bp = Breakpoint::from_str(text).unwrap();
            assert_eq!(bp.to_string(), text);
        }

        let mut bp = Breakpoint::from_str("/srv/app.php:10").unwrap();
        bp.enabled = false;
        assert_eq!(bp.to_string(), "/srv/app.php:10 (disabled)");
    }

    #[test]
    fn test_is_at() {
        let bp = Breakpoint::new(BreakpointLocation::line("/srv/app.php", 10));
        assert!(bp.is_at(Path::new("/srv/app.php"), 10));
        assert!(!bp.is_at(Path::new("/srv/app.php"), 11));
        assert!(!Breakpoint::new(BreakpointLocation::function("f")).is_at(Path::new("f"), 0));
    }

    #[test]
    fn test_serde_skips_engine_id() {
        let mut bp = Breakpoint::new(BreakpointLocation::line("/srv/app.php", 3));
        bp.engine_id = Some("17".to_string());

        let json = serde_json::to_string(&bp).unwrap();
        assert!(!json.contains("17\""));
        assert!(json.contains("\"type\":\"line\""));

        let back: Breakpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.engine_id, None);
        assert_eq!(back.loc, bp.loc);
        assert!(back.enabled);
    }
}
