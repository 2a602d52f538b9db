// Tolerant CSV body parsing: the first line is always the header, blank lines are
// skipped, a malformed line is reported and never aborts the batch.

use crate::models::{ParseError, Record, Schema};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// 1-based line number in the body (the header is line 1).
    pub line_number: usize,
    pub record: Record,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LineError {
    pub line_number: usize,
    pub error: ParseError,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    /// Non-blank data lines seen.
    pub lines: usize,
    pub records: Vec<ParsedLine>,
    pub errors: Vec<LineError>,
}

pub fn parse_body(body: &str, schema: Schema) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    for (idx, raw) in body.lines().enumerate().skip(1) {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        batch.lines += 1;
        let line_number = idx + 1;
        match schema.parse_line(line) {
            Ok(record) => batch.records.push(ParsedLine {
                line_number,
                record,
            }),
            Err(error) => batch.errors.push(LineError { line_number, error }),
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_skipped_even_when_it_looks_like_data() {
        let body = "sw0,1.00,1.00,1\nsw1,2.00,2.00,2\n";
        let batch = parse_body(body, Schema::V1);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].record.switch_id, "sw1");
        assert_eq!(batch.records[0].line_number, 2);
    }

    #[test]
    fn blank_lines_are_not_counted() {
        let body = "switch_id,bandwidth_mbps,latency_ms,packet_errors\n\n   \nsw1,2.00,2.00,2\n\r\n";
        let batch = parse_body(body, Schema::V1);
        assert_eq!(batch.lines, 1);
        assert_eq!(batch.records.len(), 1);
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn errors_carry_line_numbers() {
        let body = "timestamp,switch_id,bandwidth_mbps,latency_ms,packet_errors\n\
                    100,sw1,1.00,1.00,1\n\
                    oops\n\
                    300,sw3,3.00,3.00,x\n\
                    200,sw2,2.00,2.00,2\n";
        let batch = parse_body(body, Schema::V2);
        assert_eq!(batch.lines, 4);
        assert_eq!(batch.records.len(), 2);
        let lines: Vec<usize> = batch.errors.iter().map(|e| e.line_number).collect();
        assert_eq!(lines, vec![3, 4]);
        let stamps: Vec<Option<i64>> = batch.records.iter().map(|p| p.record.timestamp).collect();
        assert_eq!(stamps, vec![Some(100), Some(200)]);
    }

    #[test]
    fn empty_body_yields_nothing() {
        assert_eq!(parse_body("", Schema::V2), ParsedBatch::default());
        assert_eq!(
            parse_body("timestamp,switch_id,bandwidth_mbps,latency_ms,packet_errors\n", Schema::V2),
            ParsedBatch::default()
        );
    }

    #[test]
    fn v1_batch_has_no_timestamp() {
        let body = "switch_id,bandwidth_mbps,latency_ms,packet_errors\nsw5,1234.56,3.14,0\n";
        let batch = parse_body(body, Schema::V1);
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.records[0].record.timestamp, None);
    }
}
