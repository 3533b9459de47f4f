//! Fixed NACHA change-code and return-code tables.
//!
//! The code sets below are deliberately exact: downstream reconciliation
//! relies on this specific subset, and unlisted codes must fall through to
//! the "unhandled" paths rather than being generalized.

/// What a Notification of Change asks us to fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEffect {
    /// Replace the (encrypted) account number with corrected data.
    pub fix_account: bool,
    /// Replace the routing number with corrected data.
    pub fix_routing: bool,
    /// Reject the depository regardless of any field fix.
    pub reject: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeDisposition {
    Apply(ChangeEffect),
    /// C04 (name change) and C09 (individual id) are carried by humans, not
    /// by this system.
    Unsupported,
    Unknown,
}

pub fn change_disposition(code: &str) -> ChangeDisposition {
    let (fix_account, fix_routing, reject) = match code {
        "C01" => (true, false, false),
        "C02" => (false, true, false),
        "C03" => (true, true, false),
        "C04" | "C09" => return ChangeDisposition::Unsupported,
        "C05" => (false, false, true),
        "C06" => (true, false, true),
        "C07" => (true, true, true),
        "C08" | "C13" | "C14" => (false, false, true),
        _ => return ChangeDisposition::Unknown,
    };
    ChangeDisposition::Apply(ChangeEffect {
        fix_account,
        fix_routing,
        reject,
    })
}

/// Which depositories a return code condemns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDisposition {
    /// Reject the destination/receiver depository.
    RejectReceiver,
    /// Reject both originator and receiver depositories.
    RejectBoth,
    /// The match and reversal already succeeded; statuses stay unchanged and
    /// the caller gets a non-fatal "unhandled return code" error.
    Unhandled,
}

pub fn return_disposition(code: &str) -> ReturnDisposition {
    match code {
        "R02" | "R05" | "R07" | "R10" | "R12" | "R13" | "R16" | "R20" | "R28" | "R29" | "R30"
        | "R32" | "R34" | "R37" | "R38" | "R39" => ReturnDisposition::RejectReceiver,
        "R14" | "R15" => ReturnDisposition::RejectBoth,
        _ => ReturnDisposition::Unhandled,
    }
}
