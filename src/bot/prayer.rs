//! Prayer-times lookup against the aladhan timings endpoint.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// City and country are fixed; they are not parsed from the message.
pub const CITY: &str = "قوص";
pub const COUNTRY: &str = "مصر";

/// Calculation method passed to the endpoint.
const METHOD: u8 = 8;

const ENDPOINT: &str = "http://api.aladhan.com/v1/timingsByCity";

/// Deadline after which the request is aborted and treated as a timeout.
const REQUEST_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub enum PrayerError {
    /// HTTP 404 — the fixed city/country was not recognized.
    CityNotFound,
    /// Any other non-success HTTP status.
    Status(u16),
    Timeout,
    Network(String),
    /// Response body did not match the expected payload.
    Payload(String),
}

impl fmt::Display for PrayerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CityNotFound => write!(f, "city/country not found"),
            Self::Status(status) => write!(f, "unexpected HTTP status {status}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::Payload(e) => write!(f, "malformed payload: {e}"),
        }
    }
}

impl std::error::Error for PrayerError {}

/// The six named timings extracted from the response.
#[derive(Debug, Clone, Deserialize)]
pub struct Timings {
    #[serde(rename = "Fajr")]
    pub fajr: String,
    #[serde(rename = "Sunrise")]
    pub sunrise: String,
    #[serde(rename = "Dhuhr")]
    pub dhuhr: String,
    #[serde(rename = "Asr")]
    pub asr: String,
    #[serde(rename = "Maghrib")]
    pub maghrib: String,
    #[serde(rename = "Isha")]
    pub isha: String,
}

#[derive(Deserialize)]
struct TimingsResponse {
    code: i64,
    data: TimingsData,
}

#[derive(Deserialize)]
struct TimingsData {
    timings: Timings,
}

pub struct PrayerClient {
    http: reqwest::Client,
    endpoint: String,
}

impl PrayerClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: ENDPOINT.to_string(),
        }
    }

    /// Fetch the timings for the fixed city/country. Single attempt, no
    /// automatic retry.
    pub async fn fetch_timings(&self) -> Result<Timings, PrayerError> {
        let url = format!(
            "{}?city={}&country={}&method={}",
            self.endpoint,
            urlencoding::encode(CITY),
            urlencoding::encode(COUNTRY),
            METHOD
        );

        let response = self
            .http
            .get(&url)
            .timeout(REQUEST_DEADLINE)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PrayerError::Timeout
                } else {
                    PrayerError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(PrayerError::CityNotFound);
            }
            return Err(PrayerError::Status(status.as_u16()));
        }

        let parsed: TimingsResponse = response
            .json()
            .await
            .map_err(|e| PrayerError::Payload(e.to_string()))?;

        if parsed.code != 200 {
            return Err(PrayerError::Payload(format!(
                "unexpected payload code {}",
                parsed.code
            )));
        }

        Ok(parsed.data.timings)
    }
}

impl Default for PrayerClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Reformat `HH:MM` to a 12-hour clock with Arabic AM/PM markers.
/// Hour 0 becomes 12; minutes are zero-padded.
pub fn format_to_12_hour(time: &str) -> String {
    let mut parts = time.splitn(2, ':');
    let (Some(hour_str), Some(minute_str)) = (parts.next(), parts.next()) else {
        return String::new();
    };
    let (Ok(hours), Ok(minutes)) = (
        hour_str.trim().parse::<u32>(),
        minute_str.trim().parse::<u32>(),
    ) else {
        return String::new();
    };

    let marker = if hours >= 12 { "م" } else { "ص" };
    let hour12 = match hours % 12 {
        0 => 12,
        h => h,
    };

    format!("{}:{:02} {}", hour12, minutes, marker)
}

/// The six-line schedule sent to the user.
pub fn format_schedule(timings: &Timings) -> String {
    [
        format!("مواقيت الصلاة في {CITY}, {COUNTRY}:"),
        format!("الفجر: {}", format_to_12_hour(&timings.fajr)),
        format!("الشروق: {}", format_to_12_hour(&timings.sunrise)),
        format!("الظهر: {}", format_to_12_hour(&timings.dhuhr)),
        format!("العصر: {}", format_to_12_hour(&timings.asr)),
        format!("المغرب: {}", format_to_12_hour(&timings.maghrib)),
        format!("العشاء: {}", format_to_12_hour(&timings.isha)),
    ]
    .join("\n")
}

/// User-facing Arabic string for a lookup failure.
pub fn error_reply(err: &PrayerError) -> String {
    match err {
        PrayerError::CityNotFound => format!(
            "لم أتمكن من العثور على مدينة \"{CITY}\" أو دولة \"{COUNTRY}\". يرجى التحقق من الاسم."
        ),
        PrayerError::Status(status) => format!(
            "عفواً، حدث خطأ في الشبكة أثناء الاتصال بخدمة مواقيت الصلاة ({status})."
        ),
        PrayerError::Timeout => "عفواً، استغرق طلب مواقيت الصلاة وقتاً طويلاً جداً.".to_string(),
        PrayerError::Network(_) | PrayerError::Payload(_) => {
            "عفواً، حدث خطأ أثناء جلب مواقيت الصلاة.".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_to_12_hour() {
        assert_eq!(format_to_12_hour("00:05"), "12:05 ص");
        assert_eq!(format_to_12_hour("13:00"), "1:00 م");
        assert_eq!(format_to_12_hour("23:59"), "11:59 م");
        assert_eq!(format_to_12_hour("12:00"), "12:00 م");
        assert_eq!(format_to_12_hour("04:30"), "4:30 ص");
    }

    #[test]
    fn test_format_to_12_hour_rejects_garbage() {
        assert_eq!(format_to_12_hour(""), "");
        assert_eq!(format_to_12_hour("noon"), "");
        assert_eq!(format_to_12_hour("12"), "");
    }

    #[test]
    fn test_format_schedule_lines() {
        let timings = Timings {
            fajr: "04:30".to_string(),
            sunrise: "06:01".to_string(),
            dhuhr: "12:05".to_string(),
            asr: "15:30".to_string(),
            maghrib: "18:10".to_string(),
            isha: "19:40".to_string(),
        };

        let schedule = format_schedule(&timings);
        let lines: Vec<&str> = schedule.lines().collect();
        assert_eq!(lines.len(), 7);
        assert!(lines[0].contains(CITY));
        assert_eq!(lines[1], "الفجر: 4:30 ص");
        assert_eq!(lines[6], "العشاء: 7:40 م");
    }

    #[test]
    fn test_not_found_reply_differs_from_network_reply() {
        let not_found = error_reply(&PrayerError::CityNotFound);
        let network = error_reply(&PrayerError::Status(500));

        assert!(not_found.contains("لم أتمكن من العثور"));
        assert!(network.contains("خطأ في الشبكة"));
        assert_ne!(not_found, network);
    }

    #[test]
    fn test_timeout_reply() {
        let reply = error_reply(&PrayerError::Timeout);
        assert!(reply.contains("وقتاً طويلاً"));
    }
}
