// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool surface for saturn: the uniform tool contract, the registry, the
//! approval mediator, output truncation, and the fuzzy replace engine.
pub mod builtin;
pub mod policy;
pub mod registry;
pub mod replace;
pub mod tool;
pub mod truncate;

pub use builtin::bash::BashTool;
pub use builtin::edit_file::EditFileTool;
pub use builtin::list_dir::ListDirTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::write_file::WriteFileTool;
pub use builtin::ReadLedger;
pub use policy::{never_cancel, ApprovalMediator, ApprovalPolicy, ApprovalRequest, Decision};
pub use registry::{ToolRegistry, ToolSchema};
pub use replace::{replace, EditError};
pub use tool::{Tool, ToolCall, ToolOutput};
pub use truncate::Truncator;
