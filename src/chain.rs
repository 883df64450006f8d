//! Everything the pipeline needs from the remote chain, behind one trait so
//! the distribution loop can be driven against a scripted endpoint in tests.
//! The live implementation talks JSON-RPC through ethers.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, H256, U256, U64};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use thiserror::Error;
use tokio::time::{sleep, timeout};

use crate::fees::FeeQuote;

abigen!(
    Erc20Token,
    r#"[
        function totalSupply() external view returns (uint256)
        function balanceOf(address owner) external view returns (uint256)
        function decimals() external view returns (uint8)
        function transfer(address to, uint256 amount) external returns (bool)
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
    ]"#
);

abigen!(
    AirdropContract,
    r#"[
        function airdropTokens(address[] calldata recipients) external
    ]"#
);

pub type Client = SignerMiddleware<Provider<Http>, LocalWallet>;

/// A rejected submission, sorted into the retry taxonomy.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("operator wallet cannot cover gas: {0}")]
    InsufficientFunds(String),
    #[error("nonce conflict: {0}")]
    NonceConflict(String),
    #[error("replacement underpriced: {0}")]
    Underpriced(String),
    #[error("endpoint unreachable: {0}")]
    Network(String),
    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// The JSON-RPC error surface is free text, so classification keys on the
/// strings geth-family nodes actually emit. Confined to this one spot.
pub fn classify_rejection(message: &str) -> SubmitError {
    let lower = message.to_lowercase();
    if lower.contains("insufficient funds") {
        SubmitError::InsufficientFunds(message.to_owned())
    } else if lower.contains("nonce too low")
        || lower.contains("nonce has already been used")
        || lower.contains("already known")
    {
        SubmitError::NonceConflict(message.to_owned())
    } else if lower.contains("underpriced") || lower.contains("replacement fee too low") {
        SubmitError::Underpriced(message.to_owned())
    } else if lower.contains("timed out")
        || lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("error sending request")
    {
        SubmitError::Network(message.to_owned())
    } else {
        SubmitError::Rejected(message.to_owned())
    }
}

/// Point-in-time inclusion state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Pending,
    Succeeded { gas_used: U256 },
    Reverted,
}

/// Terminal view after a bounded confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed { gas_used: U256 },
    Reverted,
    /// The window closed without a receipt. Not a failure verdict: the
    /// transaction is still out there and may land later.
    TimedOut,
}

/// Operations the distribution pipeline consumes from the chain.
#[async_trait]
pub trait ChainEndpoint: Send + Sync {
    /// Address whose key signs every outgoing transaction.
    fn operator(&self) -> Address;
    /// The contract whose batched-transfer call delivers the tokens.
    fn distribution_contract(&self) -> Address;

    async fn token_balance(&self, holder: Address) -> Result<U256>;
    async fn token_total_supply(&self) -> Result<U256>;
    async fn native_balance(&self, account: Address) -> Result<U256>;
    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;
    async fn next_nonce(&self, account: Address) -> Result<U256>;

    async fn approve(&self, spender: Address, amount: U256) -> Result<H256, SubmitError>;
    async fn transfer_tokens(&self, to: Address, amount: U256) -> Result<H256, SubmitError>;
    async fn submit_airdrop(
        &self,
        recipients: &[Address],
        nonce: U256,
        fees: &FeeQuote,
    ) -> Result<H256, SubmitError>;

    async fn transaction_status(&self, tx: H256) -> Result<TxStatus>;
}

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

/// Polls for inclusion until `wait` elapses. Expiry of the timer is decided
/// by one last direct status lookup, so a transaction that landed just as
/// the window closed is still reported confirmed.
pub async fn wait_for_inclusion<E>(endpoint: &E, tx: H256, wait: Duration) -> Result<ConfirmOutcome>
where
    E: ChainEndpoint + ?Sized,
{
    let polled = timeout(wait, async {
        loop {
            match endpoint.transaction_status(tx).await? {
                TxStatus::Succeeded { gas_used } => {
                    return Ok(ConfirmOutcome::Confirmed { gas_used })
                }
                TxStatus::Reverted => return Ok(ConfirmOutcome::Reverted),
                TxStatus::Pending => sleep(RECEIPT_POLL_INTERVAL).await,
            }
        }
    })
    .await;

    match polled {
        Ok(outcome) => outcome,
        Err(_) => match endpoint.transaction_status(tx).await? {
            TxStatus::Succeeded { gas_used } => Ok(ConfirmOutcome::Confirmed { gas_used }),
            TxStatus::Reverted => Ok(ConfirmOutcome::Reverted),
            TxStatus::Pending => Ok(ConfirmOutcome::TimedOut),
        },
    }
}

/// Waits for `tx` and insists on success; used where anything short of a
/// clean confirmation aborts the caller (top-ups, burns).
pub async fn require_confirmed<E>(
    endpoint: &E,
    tx: H256,
    wait: Duration,
    what: &str,
) -> Result<U256>
where
    E: ChainEndpoint + ?Sized,
{
    match wait_for_inclusion(endpoint, tx, wait).await? {
        ConfirmOutcome::Confirmed { gas_used } => Ok(gas_used),
        ConfirmOutcome::Reverted => Err(anyhow!("{what} {tx:#x} reverted")),
        ConfirmOutcome::TimedOut => Err(anyhow!(
            "{what} {tx:#x} was not confirmed within {wait:?}"
        )),
    }
}

/// Live endpoint over HTTP JSON-RPC with a local signing key. Submissions
/// are rate-limited so bursts of retries cannot hammer the provider.
pub struct RpcEndpoint {
    client: Arc<Client>,
    token: Erc20Token<Client>,
    airdrop: AirdropContract<Client>,
    operator: Address,
    limiter: DefaultDirectRateLimiter,
}

impl RpcEndpoint {
    pub async fn connect(
        rpc_url: &str,
        private_key: &str,
        token: Address,
        airdrop: Address,
        rate_limit: NonZeroU32,
    ) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url).context("invalid RPC URL")?;
        let chain_id = provider
            .get_chainid()
            .await
            .context("failed to read the chain id from the endpoint")?;
        let wallet: LocalWallet = private_key
            .trim()
            .parse()
            .context("PRIVATE_KEY is not a valid hex private key")?;
        let wallet = wallet.with_chain_id(chain_id.as_u64());
        let operator = wallet.address();
        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        Ok(Self {
            token: Erc20Token::new(token, client.clone()),
            airdrop: AirdropContract::new(airdrop, client.clone()),
            client,
            operator,
            limiter: RateLimiter::direct(Quota::per_second(rate_limit)),
        })
    }

    pub async fn token_decimals(&self) -> Result<u8> {
        self.token
            .decimals()
            .call()
            .await
            .map_err(|e| anyhow!("failed to read token decimals: {e}"))
    }
}

#[async_trait]
impl ChainEndpoint for RpcEndpoint {
    fn operator(&self) -> Address {
        self.operator
    }

    fn distribution_contract(&self) -> Address {
        self.airdrop.address()
    }

    async fn token_balance(&self, holder: Address) -> Result<U256> {
        self.token
            .balance_of(holder)
            .call()
            .await
            .map_err(|e| anyhow!("balanceOf({holder:#x}) failed: {e}"))
    }

    async fn token_total_supply(&self) -> Result<U256> {
        self.token
            .total_supply()
            .call()
            .await
            .map_err(|e| anyhow!("totalSupply failed: {e}"))
    }

    async fn native_balance(&self, account: Address) -> Result<U256> {
        self.client
            .get_balance(account, None)
            .await
            .map_err(|e| anyhow!("eth_getBalance({account:#x}) failed: {e}"))
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        self.token
            .allowance(owner, spender)
            .call()
            .await
            .map_err(|e| anyhow!("allowance({owner:#x}, {spender:#x}) failed: {e}"))
    }

    async fn next_nonce(&self, account: Address) -> Result<U256> {
        self.client
            .get_transaction_count(account, None)
            .await
            .map_err(|e| anyhow!("eth_getTransactionCount({account:#x}) failed: {e}"))
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<H256, SubmitError> {
        self.limiter.until_ready().await;
        let call = self.token.approve(spender, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| classify_rejection(&e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn transfer_tokens(&self, to: Address, amount: U256) -> Result<H256, SubmitError> {
        self.limiter.until_ready().await;
        let call = self.token.transfer(to, amount);
        let pending = call
            .send()
            .await
            .map_err(|e| classify_rejection(&e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn submit_airdrop(
        &self,
        recipients: &[Address],
        nonce: U256,
        fees: &FeeQuote,
    ) -> Result<H256, SubmitError> {
        self.limiter.until_ready().await;
        let mut call = self.airdrop.airdrop_tokens(recipients.to_vec());
        call.tx.set_nonce(nonce);
        call.tx.set_gas(fees.gas_limit);
        match &mut call.tx {
            TypedTransaction::Eip1559(inner) => {
                inner.max_fee_per_gas = Some(fees.max_fee_per_gas);
                inner.max_priority_fee_per_gas = Some(fees.max_priority_fee_per_gas);
            }
            other => {
                other.set_gas_price(fees.max_fee_per_gas);
            }
        }
        let pending = call
            .send()
            .await
            .map_err(|e| classify_rejection(&e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_status(&self, tx: H256) -> Result<TxStatus> {
        let receipt = self
            .client
            .get_transaction_receipt(tx)
            .await
            .map_err(|e| anyhow!("receipt lookup for {tx:#x} failed: {e}"))?;
        Ok(match receipt {
            None => TxStatus::Pending,
            Some(r) if r.status == Some(U64::from(1)) => TxStatus::Succeeded {
                gas_used: r.gas_used.unwrap_or_default(),
            },
            Some(_) => TxStatus::Reverted,
        })
    }
}
