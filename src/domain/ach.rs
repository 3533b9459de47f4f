use crate::error::{Result, TransferError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned to an entry at creation. The sole correlation key used
/// to match corrections and returns back to their source records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraceNumber(pub String);

impl fmt::Display for TraceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TraceNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Routing number of the receiving institution.
    pub destination: String,
    /// Routing number of the originating institution.
    pub origin: String,
    /// YYMMDD.
    pub creation_date: String,
    /// HHMM.
    pub creation_time: String,
    /// Distinguishes same-day files to the same destination; derived from the
    /// filename sequence token.
    pub id_modifier: char,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchHeader {
    /// Standard Entry Class code, e.g. "PPD" or "WEB".
    pub sec_code: String,
    pub company_name: String,
    /// YYMMDD effective entry date.
    pub effective_date: String,
}

/// NOC addenda: the bank asks us to correct account or routing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub change_code: String,
    pub corrected_data: String,
    pub original_trace: TraceNumber,
}

/// Return addenda: the bank rejected the entry outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Return {
    pub return_code: String,
    pub original_trace: TraceNumber,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetail {
    /// Two-digit transaction code (22 checking credit, 27 checking debit,
    /// 23/28/33/38 prenotes, ...).
    pub transaction_code: u8,
    pub routing_number: String,
    pub account_number: String,
    pub amount_cents: i64,
    pub trace_number: TraceNumber,
    pub correction: Option<Correction>,
    pub retrn: Option<Return>,
}

impl EntryDetail {
    pub fn is_prenote(&self) -> bool {
        matches!(self.transaction_code, 23 | 28 | 33 | 38)
    }

    pub fn is_debit(&self) -> bool {
        matches!(self.transaction_code, 27 | 28 | 37 | 38)
    }

    fn addenda_count(&self) -> usize {
        self.correction.is_some() as usize + self.retrn.is_some() as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub header: BatchHeader,
    pub entries: Vec<EntryDetail>,
}

impl Batch {
    /// Header + entries + addenda + control record.
    pub fn line_count(&self) -> usize {
        2 + self
            .entries
            .iter()
            .map(|e| 1 + e.addenda_count())
            .sum::<usize>()
    }

    fn entry_hash(&self) -> u64 {
        self.entries
            .iter()
            .map(|e| routing_hash(&e.routing_number))
            .sum::<u64>()
            % 10_000_000_000
    }

    fn total_debits(&self) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.is_debit())
            .map(|e| e.amount_cents)
            .sum()
    }

    fn total_credits(&self) -> i64 {
        self.entries
            .iter()
            .filter(|e| !e.is_debit())
            .map(|e| e.amount_cents)
            .sum()
    }
}

/// First eight digits of the routing number, per the entry-hash convention.
fn routing_hash(routing: &str) -> u64 {
    routing
        .chars()
        .take(8)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

/// A payment-batch file: one header, ordered batches, recomputed control
/// records. Control totals are derived on encode, so mutation helpers only
/// touch the batch list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchFile {
    pub header: FileHeader,
    pub batches: Vec<Batch>,
}

impl AchFile {
    pub fn new(header: FileHeader) -> Self {
        Self {
            header,
            batches: Vec::new(),
        }
    }

    /// Encoded line count, including the control records.
    pub fn line_count(&self) -> usize {
        2 + self.batches.iter().map(Batch::line_count).sum::<usize>()
    }

    /// Every trace number present in the file, from entries and from the
    /// original-trace fields of correction/return addenda.
    pub fn trace_numbers(&self) -> Vec<&TraceNumber> {
        let mut traces = Vec::new();
        for batch in &self.batches {
            for entry in &batch.entries {
                traces.push(&entry.trace_number);
                if let Some(c) = &entry.correction {
                    traces.push(&c.original_trace);
                }
                if let Some(r) = &entry.retrn {
                    traces.push(&r.original_trace);
                }
            }
        }
        traces
    }

    /// Entries carrying a NOC addenda, paired with their batch header.
    pub fn corrections(&self) -> impl Iterator<Item = (&BatchHeader, &EntryDetail)> {
        self.batches
            .iter()
            .flat_map(|b| b.entries.iter().map(move |e| (&b.header, e)))
            .filter(|(_, e)| e.correction.is_some())
    }

    /// Entries carrying a return addenda, paired with their batch header.
    pub fn returned_entries(&self) -> impl Iterator<Item = (&BatchHeader, &EntryDetail)> {
        self.batches
            .iter()
            .flat_map(|b| b.entries.iter().map(move |e| (&b.header, e)))
            .filter(|(_, e)| e.retrn.is_some())
    }

    pub fn encode(&self) -> String {
        let mut out = String::new();
        let h = &self.header;
        out.push_str(&format!(
            "1|{}|{}|{}|{}|{}\n",
            h.destination, h.origin, h.creation_date, h.creation_time, h.id_modifier
        ));
        let mut file_entries = 0usize;
        let mut file_hash = 0u64;
        for batch in &self.batches {
            let bh = &batch.header;
            out.push_str(&format!(
                "5|{}|{}|{}\n",
                bh.sec_code, bh.company_name, bh.effective_date
            ));
            for entry in &batch.entries {
                out.push_str(&format!(
                    "6|{:02}|{}|{}|{}|{}\n",
                    entry.transaction_code,
                    entry.routing_number,
                    entry.account_number,
                    entry.amount_cents,
                    entry.trace_number
                ));
                if let Some(c) = &entry.correction {
                    out.push_str(&format!(
                        "798|{}|{}|{}\n",
                        c.change_code, c.corrected_data, c.original_trace
                    ));
                }
                if let Some(r) = &entry.retrn {
                    out.push_str(&format!("799|{}|{}\n", r.return_code, r.original_trace));
                }
            }
            out.push_str(&format!(
                "8|{}|{}|{}|{}\n",
                batch.entries.len(),
                batch.entry_hash(),
                batch.total_debits(),
                batch.total_credits()
            ));
            file_entries += batch.entries.len();
            file_hash = (file_hash + batch.entry_hash()) % 10_000_000_000;
        }
        out.push_str(&format!(
            "9|{}|{}|{}\n",
            self.batches.len(),
            file_entries,
            file_hash
        ));
        out
    }

    pub fn parse(input: &str) -> Result<Self> {
        let mut header: Option<FileHeader> = None;
        let mut batches: Vec<Batch> = Vec::new();
        let mut current: Option<Batch> = None;

        for (lineno, line) in input.lines().enumerate() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            let bad = |what: &str| {
                TransferError::Parse(format!("line {}: {}", lineno + 1, what))
            };
            match fields[0] {
                "1" => {
                    if fields.len() != 6 {
                        return Err(bad("malformed file header"));
                    }
                    header = Some(FileHeader {
                        destination: fields[1].to_string(),
                        origin: fields[2].to_string(),
                        creation_date: fields[3].to_string(),
                        creation_time: fields[4].to_string(),
                        id_modifier: fields[5].chars().next().ok_or_else(|| {
                            bad("empty file id modifier")
                        })?,
                    });
                }
                "5" => {
                    if fields.len() != 4 {
                        return Err(bad("malformed batch header"));
                    }
                    if let Some(batch) = current.take() {
                        batches.push(batch);
                    }
                    current = Some(Batch {
                        header: BatchHeader {
                            sec_code: fields[1].to_string(),
                            company_name: fields[2].to_string(),
                            effective_date: fields[3].to_string(),
                        },
                        entries: Vec::new(),
                    });
                }
                "6" => {
                    if fields.len() != 6 {
                        return Err(bad("malformed entry detail"));
                    }
                    let batch = current.as_mut().ok_or_else(|| bad("entry outside batch"))?;
                    batch.entries.push(EntryDetail {
                        transaction_code: fields[1]
                            .parse()
                            .map_err(|_| bad("bad transaction code"))?,
                        routing_number: fields[2].to_string(),
                        account_number: fields[3].to_string(),
                        amount_cents: fields[4].parse().map_err(|_| bad("bad amount"))?,
                        trace_number: TraceNumber(fields[5].to_string()),
                        correction: None,
                        retrn: None,
                    });
                }
                "798" => {
                    if fields.len() != 4 {
                        return Err(bad("malformed correction addenda"));
                    }
                    let entry = current
                        .as_mut()
                        .and_then(|b| b.entries.last_mut())
                        .ok_or_else(|| bad("addenda outside entry"))?;
                    entry.correction = Some(Correction {
                        change_code: fields[1].to_string(),
                        corrected_data: fields[2].to_string(),
                        original_trace: TraceNumber(fields[3].to_string()),
                    });
                }
                "799" => {
                    if fields.len() != 3 {
                        return Err(bad("malformed return addenda"));
                    }
                    let entry = current
                        .as_mut()
                        .and_then(|b| b.entries.last_mut())
                        .ok_or_else(|| bad("addenda outside entry"))?;
                    entry.retrn = Some(Return {
                        return_code: fields[1].to_string(),
                        original_trace: TraceNumber(fields[2].to_string()),
                    });
                }
                "8" => {
                    // Batch control totals are recomputed on encode; the
                    // record only terminates the open batch here.
                    if let Some(batch) = current.take() {
                        batches.push(batch);
                    }
                }
                "9" => {
                    if let Some(batch) = current.take() {
                        batches.push(batch);
                    }
                }
                other => {
                    return Err(bad(&format!("unknown record type {other:?}")));
                }
            }
        }

        if let Some(batch) = current.take() {
            batches.push(batch);
        }
        let header = header.ok_or_else(|| {
            TransferError::Parse("missing file header record".to_string())
        })?;
        Ok(Self { header, batches })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_entry(trace: &str, amount: i64) -> EntryDetail {
        EntryDetail {
            transaction_code: 22,
            routing_number: "231380104".to_string(),
            account_number: "744-5678-99".to_string(),
            amount_cents: amount,
            trace_number: TraceNumber(trace.to_string()),
            correction: None,
            retrn: None,
        }
    }

    fn sample_file() -> AchFile {
        AchFile {
            header: FileHeader {
                destination: "076401251".to_string(),
                origin: "121042882".to_string(),
                creation_date: "190329".to_string(),
                creation_time: "1511".to_string(),
                id_modifier: 'A',
            },
            batches: vec![Batch {
                header: BatchHeader {
                    sec_code: "PPD".to_string(),
                    company_name: "Acme Corp".to_string(),
                    effective_date: "190330".to_string(),
                },
                entries: vec![sample_entry("076401255655291", 10_000)],
            }],
        }
    }

    #[test]
    fn test_encode_parse_round_trip() {
        let file = sample_file();
        let parsed = AchFile::parse(&file.encode()).unwrap();
        assert_eq!(parsed, file);
    }

    #[test]
    fn test_line_count_matches_encoded_lines() {
        let mut file = sample_file();
        file.batches[0].entries[0].retrn = Some(Return {
            return_code: "R02".to_string(),
            original_trace: TraceNumber("076401255655291".to_string()),
        });
        assert_eq!(file.line_count(), file.encode().lines().count());
    }

    #[test]
    fn test_parse_rejects_entry_outside_batch() {
        let input = "1|076401251|121042882|190329|1511|A\n6|22|231380104|1|100|t\n";
        assert!(matches!(
            AchFile::parse(input),
            Err(TransferError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_header() {
        assert!(AchFile::parse("5|PPD|Acme|190330\n").is_err());
    }

    #[test]
    fn test_trace_numbers_include_addenda_originals() {
        let mut file = sample_file();
        file.batches[0].entries[0].correction = Some(Correction {
            change_code: "C01".to_string(),
            corrected_data: "744-5678-00".to_string(),
            original_trace: TraceNumber("121042880000001".to_string()),
        });
        let traces: Vec<String> = file.trace_numbers().iter().map(|t| t.0.clone()).collect();
        assert!(traces.contains(&"076401255655291".to_string()));
        assert!(traces.contains(&"121042880000001".to_string()));
    }

    #[test]
    fn test_prenote_and_debit_classification() {
        let mut entry = sample_entry("t", 0);
        entry.transaction_code = 23;
        assert!(entry.is_prenote());
        assert!(!entry.is_debit());
        entry.transaction_code = 27;
        assert!(!entry.is_prenote());
        assert!(entry.is_debit());
    }
}
