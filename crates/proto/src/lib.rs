//! Protocol buffer definitions for the live score stream.
//!
//! Generated client and server code for `scorestream.v1.ScoreService` plus a
//! few helpers shared by both ends of the stream.

tonic::include_proto!("scorestream.v1");

impl Version {
    /// Parses a semver-like `major.minor.patch[-suffix]` string.
    ///
    /// Components that fail to parse are reported as zero.
    pub fn parse(text: &str) -> Self {
        let (core, suffix) = match text.split_once('-') {
            Some((core, suffix)) => (core, suffix.to_owned()),
            None => (text, String::new()),
        };
        let mut parts = core.split('.').map(|p| p.trim().parse::<i32>().unwrap_or(0));
        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
            suffix,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.suffix.is_empty() {
            write!(f, "-{}", self.suffix)?;
        }
        Ok(())
    }
}

impl PlayState {
    /// Whether this state ends the play session.
    pub fn is_terminal(self) -> bool {
        matches!(self, PlayState::Finished | PlayState::Failed | PlayState::Quit)
    }
}
