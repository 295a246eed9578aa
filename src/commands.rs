// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*! Command recording. */

pub(crate) mod activation;
pub mod command_list;
pub mod lifecycle;
pub mod pending;
pub(crate) mod staging;

pub use command_list::CommandList;
pub use lifecycle::{CommandListId, CommandListState};
pub use pending::{ScissorRect, Viewport};
