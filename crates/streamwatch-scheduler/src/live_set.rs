//! Channels currently known to be live.

use std::collections::{HashMap, HashSet};

use streamwatch_helix::Stream;

/// In-memory set of live channels, keyed by broadcaster user ID.
///
/// Each entry remembers the stream ID it was last seen with. Membership is
/// what drives announcements; the stream ID is kept for diagnostics.
/// Not persisted: after a restart every channel that is still live is
/// announced once more.
#[derive(Debug, Default, Clone)]
pub struct LiveSet {
    live: HashMap<String, String>,
}

impl LiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.live.contains_key(user_id)
    }

    /// Stream ID recorded for a live channel.
    pub fn stream_id(&self, user_id: &str) -> Option<&str> {
        self.live.get(user_id).map(String::as_str)
    }

    /// Replace membership with the channels in `streams`.
    ///
    /// Returns the streams whose channel was not live before this call, in
    /// the order they appear in `streams`. Channels missing from `streams`
    /// are dropped silently.
    pub fn reconcile(&mut self, streams: &[Stream]) -> Vec<Stream> {
        let mut gone: HashSet<String> = self.live.keys().cloned().collect();
        let mut went_live = Vec::new();

        for stream in streams {
            match self.live.insert(stream.user_id.clone(), stream.id.clone()) {
                None => went_live.push(stream.clone()),
                Some(_) => {
                    gone.remove(&stream.user_id);
                }
            }
        }

        for user_id in gone {
            self.live.remove(&user_id);
        }

        went_live
    }
}
