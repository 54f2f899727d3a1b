use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Balances and matched amounts within this distance of zero count as settled.
pub const SETTLEMENT_TOLERANCE: Decimal = dec!(0.01);

pub const MAX_EXPENSE_AMOUNT: Decimal = dec!(1000000);
pub const MAX_AMOUNT_DECIMALS: u32 = 2;
pub const PRESENTATION_DECIMALS: u32 = 2;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_NOTES_LENGTH: usize = 500;

pub const DEFAULT_CONFLICT_RETRY_LIMIT: usize = 5;
