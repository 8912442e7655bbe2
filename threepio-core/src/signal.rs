// Copyright (c) The 3pio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forwards SIGINT/SIGTERM received by this process to the spawned child's
//! process group, so the whole tree it spawned is asked to shut down
//! together.

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// The signal handler implementation.
pub struct SignalHandler {
    signals: imp::Signals,
}

impl SignalHandler {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            signals: imp::Signals::new()?,
        })
    }

    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        self.signals.recv().await
    }
}

#[cfg(unix)]
mod imp {
    use super::ShutdownSignal;
    use std::io;
    use tokio::signal::unix::{SignalKind, signal};
    use tokio_stream::{StreamExt, StreamMap, wrappers::SignalStream};

    #[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
    enum SignalId {
        Int,
        Term,
    }

    pub(super) struct Signals {
        map: StreamMap<SignalId, SignalStream>,
    }

    impl Signals {
        pub(super) fn new() -> io::Result<Self> {
            let mut map = StreamMap::new();
            map.extend([
                (SignalId::Int, signal_stream(SignalKind::interrupt())?),
                (SignalId::Term, signal_stream(SignalKind::terminate())?),
            ]);
            Ok(Self { map })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownSignal> {
            self.map.next().await.map(|(id, _)| match id {
                SignalId::Int => ShutdownSignal::Interrupt,
                SignalId::Term => ShutdownSignal::Terminate,
            })
        }
    }

    fn signal_stream(kind: SignalKind) -> io::Result<SignalStream> {
        Ok(SignalStream::new(signal(kind)?))
    }
}

#[cfg(not(unix))]
mod imp {
    use super::ShutdownSignal;

    pub(super) struct Signals {
        ctrl_c_done: bool,
    }

    impl Signals {
        pub(super) fn new() -> std::io::Result<Self> {
            Ok(Self { ctrl_c_done: false })
        }

        pub(super) async fn recv(&mut self) -> Option<ShutdownSignal> {
            if self.ctrl_c_done {
                return None;
            }
            match tokio::signal::ctrl_c().await {
                Ok(()) => Some(ShutdownSignal::Interrupt),
                Err(_) => {
                    self.ctrl_c_done = true;
                    None
                }
            }
        }
    }
}
