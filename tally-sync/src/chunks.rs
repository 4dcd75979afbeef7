//! Deterministic month-chunk generation for resumable snapshots.

use chrono::Datelike;
use chrono::NaiveDate;

/// One snapshot chunk. `month` is the YYYYMM label of the chunk's end
/// month, which is the resume cursor recorded in the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub month: String,
}

/// Cover `[from, to]` exactly once with chunks of at most `months`
/// calendar months. The first chunk starts at `from` and runs to the
/// last day of the month `months - 1` ahead, clamped at `to`; later
/// chunks start on the first day of the following month.
#[must_use]
pub fn generate_chunks(from: NaiveDate, to: NaiveDate, months: u32) -> Vec<Chunk> {
    let months = months.max(1);
    let mut chunks = Vec::new();
    let mut chunk_start = from;

    while chunk_start <= to {
        let month0 = chunk_start.month0() + months - 1;
        let end_year = chunk_start.year() + (month0 / 12) as i32;
        let end_month = month0 % 12 + 1;
        let chunk_end = last_day_of_month(end_year, end_month).min(to);

        chunks.push(Chunk {
            from: chunk_start,
            to: chunk_end,
            month: chunk_end.format("%Y%m").to_string(),
        });

        if chunk_end >= to {
            break;
        }
        chunk_start = first_day_of_next_month(chunk_end);
    }

    chunks
}

fn last_day_of_month(year: i32, month: u32) -> NaiveDate {
    first_day_of_month_after(year, month)
        .pred_opt()
        .unwrap_or(NaiveDate::MAX)
}

fn first_day_of_month_after(year: i32, month: u32) -> NaiveDate {
    let (year, month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
}

fn first_day_of_next_month(date: NaiveDate) -> NaiveDate {
    first_day_of_month_after(date.year(), date.month())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn three_month_chunks_cover_half_a_year() {
        let chunks = generate_chunks(date(2024, 4, 1), date(2024, 9, 30), 3);
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].from, date(2024, 4, 1));
        assert_eq!(chunks[0].to, date(2024, 6, 30));
        assert_eq!(chunks[0].month, "202406");

        assert_eq!(chunks[1].from, date(2024, 7, 1));
        assert_eq!(chunks[1].to, date(2024, 9, 30));
        assert_eq!(chunks[1].month, "202409");
    }

    #[test]
    fn final_chunk_clamps_at_to_date() {
        let chunks = generate_chunks(date(2024, 4, 15), date(2024, 8, 10), 3);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].from, date(2024, 4, 15));
        assert_eq!(chunks[0].to, date(2024, 6, 30));
        assert_eq!(chunks[1].to, date(2024, 8, 10));
        assert_eq!(chunks[1].month, "202408");
    }

    #[test]
    fn chunks_cross_year_boundaries() {
        let chunks = generate_chunks(date(2023, 11, 1), date(2024, 5, 31), 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].to, date(2024, 1, 31));
        assert_eq!(chunks[0].month, "202401");
        assert_eq!(chunks[1].from, date(2024, 2, 1));
        assert_eq!(chunks[1].to, date(2024, 4, 30));
        assert_eq!(chunks[2].from, date(2024, 5, 1));
        assert_eq!(chunks[2].to, date(2024, 5, 31));
    }

    #[test]
    fn single_day_span_is_one_chunk() {
        let chunks = generate_chunks(date(2024, 2, 29), date(2024, 2, 29), 3);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].from, chunks[0].to);
        assert_eq!(chunks[0].month, "202402");
    }

    #[test]
    fn coverage_is_contiguous_and_exact() {
        let from = date(2022, 1, 17);
        let to = date(2024, 11, 3);
        for months in 1..=6 {
            let chunks = generate_chunks(from, to, months);
            assert_eq!(chunks.first().map(|chunk| chunk.from), Some(from));
            assert_eq!(chunks.last().map(|chunk| chunk.to), Some(to));
            for pair in chunks.windows(2) {
                assert_eq!(
                    pair[0].to.succ_opt().expect("next day"),
                    pair[1].from,
                    "gap between chunks for months={months}"
                );
            }
        }
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert!(generate_chunks(date(2024, 5, 1), date(2024, 4, 30), 3).is_empty());
    }
}
