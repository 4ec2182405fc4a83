// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! The backend layer hides hardware access behind collaborator traits so
//! the session state machine runs the same against real devices and the
//! in-process simulator.
//!
//! # Modules
//!
//! - [`camera`]: Camera backend traits, callback executor and session state machine

pub mod camera;
