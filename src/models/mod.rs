// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod gps_log;
pub mod user;
pub mod webhook;

pub use activity::{Activity, NewActivity};
pub use gps_log::{GpsLogEntry, ParentKind, StoredGpsLog};
pub use user::{ProviderConnection, User};
pub use webhook::{ActivityRecord, ExternalUserRef, WebhookPayload};
