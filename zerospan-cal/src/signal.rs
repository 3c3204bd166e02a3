// Copyright (c) 2023 Contributors to the Eclipse Foundation
//
// See the NOTICE file(s) distributed with this work for additional
// information regarding copyright ownership.
//
// This program and the accompanying materials are made available under the
// terms of the Apache Software License 2.0 which is available at
// https://www.apache.org/licenses/LICENSE-2.0, or the MIT license
// which is available at https://opensource.org/licenses/MIT.
//
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Turns `SIGINT`/`SIGTERM` into a flag a blocking wait can poll instead of
//! dying to the default disposition (§4.8 "graceful cancellation"). The
//! handler only ever touches an `AtomicU8`, the one operation POSIX
//! guarantees is async-signal-safe for our purposes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Once;

const NONE: u8 = 0;
const INTERRUPT: u8 = 1;
const TERMINATION_REQUEST: u8 = 2;

static LAST_SIGNAL: AtomicU8 = AtomicU8::new(NONE);
static INSTALL: Once = Once::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchableSignal {
    Interrupt,
    TerminationRequest,
}

extern "C" fn on_signal(signum: libc::c_int) {
    let value = if signum == libc::SIGINT { INTERRUPT } else { TERMINATION_REQUEST };
    LAST_SIGNAL.store(value, Ordering::Relaxed);
}

/// Installs the `SIGINT`/`SIGTERM` handlers once per process. Idempotent and
/// safe to call from every [`crate::monitoring`]-adjacent entry point that
/// wants cancellable blocking waits.
pub fn install() {
    INSTALL.call_once(|| unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    });
}

/// The most recently received signal since the last [`reset`], if any.
pub fn last_signal() -> Option<FetchableSignal> {
    match LAST_SIGNAL.load(Ordering::Relaxed) {
        INTERRUPT => Some(FetchableSignal::Interrupt),
        TERMINATION_REQUEST => Some(FetchableSignal::TerminationRequest),
        _ => None,
    }
}

pub fn termination_requested() -> bool {
    last_signal().is_some()
}

/// Clears the recorded signal, e.g. once a caller has acted on it.
pub fn reset() {
    LAST_SIGNAL.store(NONE, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_signal_received_by_default() {
        reset();
        assert_eq!(last_signal(), None);
        assert!(!termination_requested());
    }

    #[test]
    fn delivering_sigint_to_self_is_observed() {
        install();
        reset();
        unsafe {
            libc::raise(libc::SIGINT);
        }
        assert_eq!(last_signal(), Some(FetchableSignal::Interrupt));
        reset();
    }
}
