//! Classification of vote failures into the small set of messages a voter sees.
//!
//! The service reports refusals as free text. Rather than scattering substring
//! checks, the text is run through [`RULES`], an ordered table of predicates;
//! the first match wins and anything unmatched is [`PollErrorKind::Unknown`].
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PollErrorKind {
    AlreadyVoted,
    PollClosed,
    PollAbsent,
    InvalidCandidate,
    Unauthenticated,
    Unknown,
}

impl PollErrorKind {
    pub const ALL: [PollErrorKind; 6] = [
        PollErrorKind::AlreadyVoted,
        PollErrorKind::PollClosed,
        PollErrorKind::PollAbsent,
        PollErrorKind::InvalidCandidate,
        PollErrorKind::Unauthenticated,
        PollErrorKind::Unknown,
    ];

    pub fn message(&self) -> &'static str {
        match self {
            PollErrorKind::AlreadyVoted => "You have already voted in this poll.",
            PollErrorKind::PollClosed => "Voting has closed. This poll is no longer accepting votes.",
            PollErrorKind::PollAbsent => "No active poll is currently available.",
            PollErrorKind::InvalidCandidate => "The selected candidate is not valid.",
            PollErrorKind::Unauthenticated => {
                "You must be logged in to vote. Please log in with Internet Identity."
            }
            PollErrorKind::Unknown => "Unable to submit vote. Please try again.",
        }
    }
}

impl fmt::Display for PollErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.message())
    }
}

type Rule = (fn(&str) -> bool, PollErrorKind);

fn already_voted(msg: &str) -> bool {
    msg.contains("already voted")
}

fn closed(msg: &str) -> bool {
    msg.contains("ended") || msg.contains("expired")
}

fn absent(msg: &str) -> bool {
    msg.contains("not available")
}

fn bad_candidate(msg: &str) -> bool {
    msg.contains("Candidate") && msg.contains("not found")
}

fn unauthenticated(msg: &str) -> bool {
    msg.contains("Unauthorized") || msg.contains("authenticated")
}

/**
 * Evaluated top to bottom, first match wins
 */
pub const RULES: [Rule; 5] = [
    (already_voted, PollErrorKind::AlreadyVoted),
    (closed, PollErrorKind::PollClosed),
    (absent, PollErrorKind::PollAbsent),
    (bad_candidate, PollErrorKind::InvalidCandidate),
    (unauthenticated, PollErrorKind::Unauthenticated),
];

pub fn classify(message: &str) -> PollErrorKind {
    RULES
        .iter()
        .find(|(matches, _)| matches(message))
        .map(|(_, kind)| *kind)
        .unwrap_or(PollErrorKind::Unknown)
}

/**
 * Map any failure to the user-facing text for its category.
 *
 * Total: empty messages and values that are not errors at all fall through to
 * the generic message.
 */
pub fn normalize_poll_error<E: fmt::Display + ?Sized>(error: &E) -> &'static str {
    classify(&error.to_string()).message()
}

/**
 * Whether the failure should send the voter to the login flow rather than
 * just showing text
 */
pub fn is_auth_error<E: fmt::Display + ?Sized>(error: &E) -> bool {
    unauthenticated(&error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteError;

    #[test]
    fn test_known_service_messages() {
        let cases = [
            ("You have already voted in this poll", PollErrorKind::AlreadyVoted),
            ("Poll has ended", PollErrorKind::PollClosed),
            ("poll expired at 12:00", PollErrorKind::PollClosed),
            ("Poll not available", PollErrorKind::PollAbsent),
            ("Candidate not found", PollErrorKind::InvalidCandidate),
            ("Unauthorized: Only authenticated users can vote", PollErrorKind::Unauthenticated),
            ("caller is not authenticated", PollErrorKind::Unauthenticated),
            ("canister trapped", PollErrorKind::Unknown),
        ];

        for (message, expected) in cases {
            assert_eq!(classify(message), expected, "{}", message);
        }
    }

    #[test]
    fn test_priority_order() {
        // both "already voted" and "Unauthorized" present: the earlier rule wins
        assert_eq!(
            classify("Unauthorized: you have already voted"),
            PollErrorKind::AlreadyVoted
        );
        assert_eq!(classify("Candidate poll ended, not found"), PollErrorKind::PollClosed);
        // "not found" alone is not enough for the candidate rule
        assert_eq!(classify("Poll not found"), PollErrorKind::Unknown);
    }

    #[test]
    fn test_total_over_odd_inputs() {
        assert_eq!(normalize_poll_error(""), PollErrorKind::Unknown.message());
        assert_eq!(normalize_poll_error(&42), PollErrorKind::Unknown.message());
        assert_eq!(normalize_poll_error(&'x'), PollErrorKind::Unknown.message());

        let known: Vec<&str> = PollErrorKind::ALL.iter().map(|k| k.message()).collect();
        for input in ["", " ", "ended", "\u{0}", "Candidate", "not available"] {
            assert!(known.contains(&normalize_poll_error(input)));
        }
    }

    #[test]
    fn test_remote_errors() {
        let rejected = RemoteError::Rejected("Poll has ended".into());
        assert_eq!(
            normalize_poll_error(&rejected),
            "Voting has closed. This poll is no longer accepting votes."
        );

        let auth = RemoteError::Rejected("Unauthorized: Only authenticated users can vote".into());
        assert!(is_auth_error(&auth));
        assert!(!is_auth_error(&rejected));
    }

    #[test]
    fn test_transport_text_is_not_classified() {
        assert_eq!(
            RemoteError::Rejected("Poll has ended".into()).kind(),
            PollErrorKind::PollClosed
        );

        let tls = RemoteError::Transport("invalid peer certificate: certificate has expired".into());
        assert_eq!(tls.kind(), PollErrorKind::Unknown);
        let refused = RemoteError::Transport("not authenticated by proxy".into());
        assert_eq!(refused.kind(), PollErrorKind::Unknown);
    }
}
