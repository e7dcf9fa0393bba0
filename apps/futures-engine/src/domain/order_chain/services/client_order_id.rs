//! Client order id generation.
//!
//! Chain ids look like `SCA-16OCT-00042`: trading mode, UTC day, and a daily
//! sequence. Every leg token appends the role code, plus `-v<n>` for
//! re-placements: `SCA-16OCT-00042-SL`, `SCA-16OCT-00042-SL-v2`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parking_lot::Mutex;

use crate::domain::order_chain::value_objects::{LegRole, TradingMode};
use crate::domain::shared::{ChainId, ClientOrderId};

/// Exchange limit for `newClientOrderId`.
pub const MAX_CLIENT_ORDER_ID_LEN: usize = 36;

const MAX_DAILY_SEQUENCE: u32 = 99_999;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Generates chain ids with a per-day sequence.
#[derive(Debug)]
pub struct ClientOrderIdGenerator {
    state: Mutex<(NaiveDate, u32)>,
}

impl Default for ClientOrderIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientOrderIdGenerator {
    /// Create a generator starting at sequence 1 for today.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now().date_naive(), 0)
    }

    /// Create a generator whose next id on `date` is `last + 1`.
    #[must_use]
    pub fn starting_at(date: NaiveDate, last: u32) -> Self {
        Self {
            state: Mutex::new((date, last)),
        }
    }

    /// Next chain id for `mode`.
    pub fn next_chain_id(&self, mode: TradingMode) -> ChainId {
        self.next_chain_id_at(mode, Utc::now())
    }

    /// Next chain id for `mode` at `now`.
    ///
    /// Falls back to a random suffix once the daily sequence is exhausted.
    pub fn next_chain_id_at(&self, mode: TradingMode, now: DateTime<Utc>) -> ChainId {
        let today = now.date_naive();
        let seq = {
            let mut state = self.state.lock();
            if state.0 != today {
                *state = (today, 0);
            }
            if state.1 >= MAX_DAILY_SEQUENCE {
                None
            } else {
                state.1 += 1;
                Some(state.1)
            }
        };

        match seq {
            Some(seq) => ChainId::new(format!(
                "{}-{:02}{}-{seq:05}",
                mode.code(),
                today.day(),
                MONTHS[today.month0() as usize],
            )),
            None => {
                let suffix = uuid::Uuid::new_v4().simple().to_string();
                ChainId::new(format!("{}-FALLBACK-{}", mode.code(), &suffix[..8]))
            }
        }
    }
}

/// Token for a leg of `chain` with `role`; version 1 has no suffix.
#[must_use]
pub fn leg_token(chain: &ChainId, role: LegRole, version: u32) -> ClientOrderId {
    let token = if version <= 1 {
        format!("{chain}-{}", role.code())
    } else {
        format!("{chain}-{}-v{version}", role.code())
    };
    debug_assert!(token.len() <= MAX_CLIENT_ORDER_ID_LEN);
    ClientOrderId::new(token)
}

/// Split a leg token into chain id, role, and version.
#[must_use]
pub fn parse_leg_token(token: &ClientOrderId) -> Option<(ChainId, LegRole, u32)> {
    let parts: Vec<&str> = token.as_str().split('-').collect();
    let (version, role_idx) = match parts.last()?.strip_prefix('v') {
        Some(v) => (v.parse::<u32>().ok()?, parts.len().checked_sub(2)?),
        None => (1, parts.len().checked_sub(1)?),
    };
    if role_idx < 3 {
        return None;
    }
    let role: LegRole = parts[role_idx].parse().ok()?;
    let chain = parts[..role_idx].join("-");
    Some((ChainId::new(chain), role, version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn chain_ids_follow_daily_sequence() {
        let generator = ClientOrderIdGenerator::starting_at(at(2026, 10, 16).date_naive(), 0);
        let a = generator.next_chain_id_at(TradingMode::Scalp, at(2026, 10, 16));
        let b = generator.next_chain_id_at(TradingMode::Swing, at(2026, 10, 16));
        assert_eq!(a.as_str(), "SCA-16OCT-00001");
        assert_eq!(b.as_str(), "SWI-16OCT-00002");
    }

    #[test]
    fn sequence_resets_on_new_day() {
        let generator = ClientOrderIdGenerator::starting_at(at(2026, 10, 16).date_naive(), 41);
        let a = generator.next_chain_id_at(TradingMode::Position, at(2026, 10, 16));
        let b = generator.next_chain_id_at(TradingMode::Position, at(2026, 10, 17));
        assert_eq!(a.as_str(), "POS-16OCT-00042");
        assert_eq!(b.as_str(), "POS-17OCT-00001");
    }

    #[test]
    fn exhausted_sequence_falls_back() {
        let generator =
            ClientOrderIdGenerator::starting_at(at(2026, 1, 2).date_naive(), MAX_DAILY_SEQUENCE);
        let id = generator.next_chain_id_at(TradingMode::UltraFast, at(2026, 1, 2));
        assert!(id.as_str().starts_with("ULT-FALLBACK-"));
        assert_eq!(id.as_str().len(), "ULT-FALLBACK-".len() + 8);
    }

    #[test]
    fn leg_tokens_and_versions() {
        let chain = ChainId::new("SCA-16OCT-00042");
        assert_eq!(leg_token(&chain, LegRole::StopLoss, 1).as_str(), "SCA-16OCT-00042-SL");
        assert_eq!(
            leg_token(&chain, LegRole::StopLoss, 3).as_str(),
            "SCA-16OCT-00042-SL-v3"
        );
        let longest = leg_token(&chain, LegRole::Dca(3), 99);
        assert!(longest.as_str().len() <= MAX_CLIENT_ORDER_ID_LEN);
    }

    #[test]
    fn parse_round_trip() {
        let chain = ChainId::new("SCA-16OCT-00042");
        let token = leg_token(&chain, LegRole::TakeProfit(2), 2);
        assert_eq!(
            parse_leg_token(&token),
            Some((chain.clone(), LegRole::TakeProfit(2), 2))
        );
        let token = leg_token(&chain, LegRole::Entry, 1);
        assert_eq!(parse_leg_token(&token), Some((chain, LegRole::Entry, 1)));
        assert_eq!(parse_leg_token(&ClientOrderId::new("garbage")), None);
    }
}
