use ethers::types::U256;

/// Price and ceiling attached to one submission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub gas_limit: U256,
}

/// Escalating fee schedule: a fixed base price plus a bump per retry, so a
/// resubmission can always replace its stuck predecessor in the pool.
#[derive(Debug, Clone)]
pub struct FeePolicy {
    base_fee: U256,
    retry_bump: U256,
    gas_limit: U256,
}

impl FeePolicy {
    pub fn new(base_fee_wei: u64, retry_bump_wei: u64, gas_limit: u64) -> Self {
        Self {
            base_fee: U256::from(base_fee_wei),
            // a zero bump could never outbid the previous attempt
            retry_bump: U256::from(retry_bump_wei.max(1)),
            gas_limit: U256::from(gas_limit),
        }
    }

    pub fn quote(&self, attempt: u32) -> FeeQuote {
        let price = self.base_fee + self.retry_bump * U256::from(attempt);
        FeeQuote {
            max_fee_per_gas: price,
            max_priority_fee_per_gas: price,
            gas_limit: self.gas_limit,
        }
    }
}
