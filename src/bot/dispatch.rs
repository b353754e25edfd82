//! Ordered command routing.
//!
//! One-to-one messages are matched against a fixed predicate chain; the
//! first match wins and later predicates are never consulted. Group
//! messages recognize a single announce trigger.

/// Status-report command (exact match).
pub const STATUS_KEYWORD: &str = "حالة الرسالة";

/// "My number" command, English phrasing (substring, case-insensitive).
pub const MY_NUMBER_EN: &str = "my number";

/// "My number" command, Arabic phrasing (substring).
pub const MY_NUMBER_AR: &str = "رقمي";

/// "My info" command (exact match).
pub const MY_INFO_KEYWORD: &str = "معلوماتي";

/// Group-info-by-invite-link command token (prefix match).
pub const GROUP_INFO_PREFIX: &str = "!معلومات-الجروب";

/// Prayer-times command (prefix match).
pub const PRAYER_PREFIX: &str = ".الصلاة";

/// Group announce trigger (exact match after trimming).
pub const ANNOUNCE_KEYWORD: &str = ".هام";

/// Commands recognized in one-to-one conversations, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StatusReport,
    MyNumber,
    MyInfo,
    GroupInfo,
    PrayerTimes,
    /// No explicit command matched; forward to the AI responder.
    Chat,
}

impl Command {
    /// Route one-to-one message text to exactly one command.
    pub fn parse(text: &str) -> Command {
        let lowered = text.to_lowercase();
        if lowered == STATUS_KEYWORD {
            Command::StatusReport
        } else if lowered.contains(MY_NUMBER_EN) || text.contains(MY_NUMBER_AR) {
            Command::MyNumber
        } else if lowered == MY_INFO_KEYWORD {
            Command::MyInfo
        } else if lowered.starts_with(GROUP_INFO_PREFIX) {
            Command::GroupInfo
        } else if lowered.starts_with(PRAYER_PREFIX) {
            Command::PrayerTimes
        } else {
            Command::Chat
        }
    }
}

/// Whether group message text triggers the announce broadcast.
pub fn is_announce(text: &str) -> bool {
    text.trim() == ANNOUNCE_KEYWORD
}
