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

//! Environment variable name constants for the DBGp client.
//!
//! These constants are the single source of truth for every environment
//! variable the client reads, so the CLI, the configuration loader and the
//! tests never disagree on spelling.
//!
//! # Environment Variables
//!
//! - [`DBGP_PORT`] - Port the client listens on for engine connections
//! - [`DBGP_CONFIG`] - Location of the TOML configuration file

/// Environment variable overriding the listening port.
///
/// Engines such as Xdebug connect *to* the debugger client, so this is the
/// port configured on the engine side as well (`xdebug.client_port`).
///
/// # Default
///
/// When not set, the port from the configuration file is used, which itself
/// defaults to `9000`.
///
/// # Examples
///
/// ```bash
/// DBGP_PORT=9003 dbgp
/// ```
pub const DBGP_PORT: &str = "DBGP_PORT";

/// Environment variable overriding the configuration file location.
///
/// # Default
///
/// When not set, the configuration lives at `~/.dbgp.toml`.
///
/// # Examples
///
/// ```bash
/// DBGP_CONFIG=/tmp/dbgp-test.toml dbgp
/// ```
pub const DBGP_CONFIG: &str = "DBGP_CONFIG";
