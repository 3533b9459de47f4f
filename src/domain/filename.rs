use crate::error::{Result, TransferError};
use chrono::NaiveDate;

/// Default template; per-routing-number overrides come from the config store.
pub const DEFAULT_TEMPLATE: &str = "{YYYYMMDD}-{routingNumber}-{sequence}.ach";

/// Suffix appended after a successful upload so future globbing skips the
/// file. This rename is the only duplicate-upload guard.
pub const UPLOADED_SUFFIX: &str = ".uploaded";

/// Render a sequence number as its filename token: 1-9 stay digits, 10-35
/// become A-Z. Downstream consumers sort filenames lexically to find the
/// newest file, so this wrap must hold exactly.
pub fn render_sequence(seq: u8) -> Result<String> {
    match seq {
        1..=9 => Ok(seq.to_string()),
        10..=35 => Ok(char::from(b'A' + seq - 10).to_string()),
        _ => Err(TransferError::Validation(format!(
            "sequence {seq} outside 1-35"
        ))),
    }
}

pub fn parse_sequence(token: &str) -> Result<u8> {
    let mut chars = token.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return Err(TransferError::Filename(token.to_string()));
    };
    match c {
        '1'..='9' => Ok(c as u8 - b'0'),
        'A'..='Z' => Ok(c as u8 - b'A' + 10),
        _ => Err(TransferError::Filename(token.to_string())),
    }
}

/// The identifying parts of a merged-file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameParts {
    pub date: NaiveDate,
    pub routing_number: String,
    pub sequence: u8,
}

pub fn render(template: &str, parts: &FilenameParts) -> Result<String> {
    let seq = render_sequence(parts.sequence)?;
    Ok(template
        .replace("{YYYYMMDD}", &parts.date.format("%Y%m%d").to_string())
        .replace("{routingNumber}", &parts.routing_number)
        .replace("{sequence}", &seq))
}

/// Inverse of [`render`] for the default template shape
/// `<date>-<routing>-<sequence>.ach`.
pub fn parse(name: &str) -> Result<FilenameParts> {
    let stem = name
        .strip_suffix(".ach")
        .ok_or_else(|| TransferError::Filename(name.to_string()))?;
    let mut parts = stem.splitn(3, '-');
    let (Some(date), Some(routing), Some(seq)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(TransferError::Filename(name.to_string()));
    };
    Ok(FilenameParts {
        date: NaiveDate::parse_from_str(date, "%Y%m%d")
            .map_err(|_| TransferError::Filename(name.to_string()))?,
        routing_number: routing.to_string(),
        sequence: parse_sequence(seq)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_round_trip() {
        for n in 1..=35 {
            let token = render_sequence(n).unwrap();
            assert_eq!(parse_sequence(&token).unwrap(), n, "seq {n}");
        }
        assert_eq!(render_sequence(9).unwrap(), "9");
        assert_eq!(render_sequence(10).unwrap(), "A");
        assert_eq!(render_sequence(35).unwrap(), "Z");
        assert!(render_sequence(0).is_err());
        assert!(render_sequence(36).is_err());
    }

    #[test]
    fn test_render_default_template() {
        let parts = FilenameParts {
            date: NaiveDate::from_ymd_opt(2019, 3, 29).unwrap(),
            routing_number: "076401251".to_string(),
            sequence: 1,
        };
        assert_eq!(
            render(DEFAULT_TEMPLATE, &parts).unwrap(),
            "20190329-076401251-1.ach"
        );
    }

    #[test]
    fn test_filename_round_trip() {
        for seq in [1, 9, 10, 26, 35] {
            let parts = FilenameParts {
                date: NaiveDate::from_ymd_opt(2019, 3, 29).unwrap(),
                routing_number: "076401251".to_string(),
                sequence: seq,
            };
            let name = render(DEFAULT_TEMPLATE, &parts).unwrap();
            assert_eq!(parse(&name).unwrap(), parts);
        }
    }

    #[test]
    fn test_lexical_order_tracks_sequence() {
        let names: Vec<String> = (1..=35)
            .map(|seq| {
                render(
                    DEFAULT_TEMPLATE,
                    &FilenameParts {
                        date: NaiveDate::from_ymd_opt(2019, 3, 29).unwrap(),
                        routing_number: "076401251".to_string(),
                        sequence: seq,
                    },
                )
                .unwrap()
            })
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("20190329-076401251-1.txt").is_err());
        assert!(parse("garbage.ach").is_err());
        assert!(parse("20190329-076401251-0.ach").is_err());
    }
}
