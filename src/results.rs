//! Scoring of raw result rows into a ranked standings table.

use serde::Serialize;

use crate::models::ResultRow;

/// One scored row of the standings table.
#[derive(Debug, Clone, Serialize)]
pub struct Standing {
    pub rank: usize,
    pub ex_aequo: bool,
    /// Share of cast votes, one decimal, 0 when nothing was cast yet.
    pub percent: f64,
    #[serde(flatten)]
    pub row: ResultRow,
}

/// Orders rows by vote count and assigns competition ranking: tied rows
/// share a rank and the next rank skips past them (5, 5, 3 ranks as
/// 1, 1, 3). Ties on the count are broken alphabetically for stable output.
pub fn standings(rows: &[ResultRow]) -> Vec<Standing> {
    let total: i64 = rows.iter().map(|row| row.vote_count).sum();
    let mut sorted: Vec<ResultRow> = rows.to_vec();
    sorted.sort_by(|a, b| {
        b.vote_count
            .cmp(&a.vote_count)
            .then_with(|| a.full_name().cmp(&b.full_name()))
    });

    sorted
        .iter()
        .enumerate()
        .map(|(index, row)| {
            let rank = sorted
                .iter()
                .position(|other| other.vote_count == row.vote_count)
                .map_or(index, |first| first)
                + 1;
            let ex_aequo = sorted
                .iter()
                .filter(|other| other.vote_count == row.vote_count)
                .count()
                > 1;
            let percent = if total == 0 {
                0.0
            } else {
                (row.vote_count as f64 / total as f64 * 1000.0).round() / 10.0
            };
            Standing {
                rank,
                ex_aequo,
                percent,
                row: row.clone(),
            }
        })
        .collect()
}

/// Every rank-1 row with at least one vote. More than one entry means the
/// election ended ex æquo; an empty list means nobody voted.
pub fn leaders(standings: &[Standing]) -> Vec<&Standing> {
    standings
        .iter()
        .filter(|standing| standing.rank == 1 && standing.row.vote_count > 0)
        .collect()
}
