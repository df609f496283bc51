use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSeverity {
    Warning,
    Error,
    Critical,
}

/// Human-readable explanation of a raw bridge failure, with an optional
/// one-click remediation command.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorAdvice {
    pub raw: String,
    pub title: &'static str,
    pub description: &'static str,
    pub action_label: Option<&'static str>,
    pub action_command: Option<&'static str>,
    pub severity: AdviceSeverity,
}

struct AdviceEntry {
    needle: &'static str,
    title: &'static str,
    description: &'static str,
    action_label: Option<&'static str>,
    action_command: Option<&'static str>,
    severity: AdviceSeverity,
}

const RESTART_SERVER: &str = "adb kill-server && adb start-server";

// Ordered: first matching needle wins, so the more specific patterns sit on top.
const ADVICE_DB: &[AdviceEntry] = &[
    AdviceEntry {
        needle: "more than one device",
        title: "Multiple devices attached",
        description: "More than one device is connected. Detach the extras or target a specific serial.",
        action_label: None,
        action_command: None,
        severity: AdviceSeverity::Error,
    },
    AdviceEntry {
        needle: "no devices/emulators found",
        title: "No device found",
        description: "No attached device was detected. Check the USB cable and make sure USB debugging is enabled in Developer Options.",
        action_label: Some("Restart bridge service"),
        action_command: Some(RESTART_SERVER),
        severity: AdviceSeverity::Error,
    },
    AdviceEntry {
        needle: "device offline",
        title: "Device offline",
        description: "The device is attached but not responding. Replugging the cable or restarting the bridge usually recovers it.",
        action_label: Some("Restart bridge service"),
        action_command: Some(RESTART_SERVER),
        severity: AdviceSeverity::Warning,
    },
    AdviceEntry {
        needle: "unauthorized",
        title: "Device not authorized",
        description: "Accept the debugging authorization prompt on the device and tick \"Always allow from this computer\".",
        action_label: None,
        action_command: None,
        severity: AdviceSeverity::Warning,
    },
    AdviceEntry {
        needle: "insufficient storage",
        title: "Insufficient storage",
        description: "The device has no room left for this operation. Free up space and retry.",
        action_label: None,
        action_command: None,
        severity: AdviceSeverity::Error,
    },
    AdviceEntry {
        needle: "protocol fault",
        title: "Transport fault",
        description: "The USB link is unstable. Try another port or cable.",
        action_label: None,
        action_command: None,
        severity: AdviceSeverity::Critical,
    },
    AdviceEntry {
        needle: "permission denied",
        title: "Permission denied",
        description: "The operation needs privileges the shell does not have. Root access may be required.",
        action_label: None,
        action_command: None,
        severity: AdviceSeverity::Error,
    },
    AdviceEntry {
        needle: "is read-only",
        title: "Read-only filesystem",
        description: "The target directory is mounted read-only. Remounting read-write requires root.",
        action_label: None,
        action_command: None,
        severity: AdviceSeverity::Warning,
    },
];

/// Best-effort classification of a raw bridge error. Returns None for
/// failures with no known remediation, which callers surface verbatim.
pub fn analyze_error(raw: &str) -> Option<ErrorAdvice> {
    let haystack = raw.to_lowercase();
    ADVICE_DB
        .iter()
        .find(|entry| haystack.contains(entry.needle))
        .map(|entry| ErrorAdvice {
            raw: raw.to_string(),
            title: entry.title,
            description: entry.description,
            action_label: entry.action_label,
            action_command: entry.action_command,
            severity: entry.severity,
        })
}
