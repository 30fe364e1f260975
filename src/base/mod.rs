//! Base types and error handling.
//!
//! Provides foundational types mirroring Chromium's `net/base/`:
//! - [`NetError`](neterror::NetError): Network error codes and their [`ErrorKind`](neterror::ErrorKind)
//! - [`LoadState`](loadstate::LoadState): Request loading states from `load_states_list.h`
//! - [`Interrupt`](cancel::Interrupt): cancellation and deadline plumbing
//! - [`ClientTrace`](trace::ClientTrace): lifecycle hooks for diagnostics

pub mod cancel;
pub mod context;
pub mod loadstate;
pub mod neterror;
pub mod trace;
