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

// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
// SPDX-License-Identifier: AGPL-3.0
//! DBGp Common - Shared functionality for DBGp client components
//!
//! This crate provides the data model (breakpoints, stack frames, variable
//! trees), the user configuration and the logging setup used by the
//! transport, protocol, session and front-end crates.

/// Common types used throughout the client: breakpoints, frames and variables
pub mod types;

/// User configuration loaded from TOML
pub mod config;
/// Environment variable names read by the client
pub mod env;
/// Logging setup and utilities for consistent logging across components
pub mod logging;

pub use config::*;
pub use types::*;
