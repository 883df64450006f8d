//! Batch planning and the end-to-end distribution loop.
//!
//! One logical thread of control: batches go out strictly in order, and a
//! batch only advances the pipeline once it is terminal (confirmed, or given
//! up on). The nonce cursor and the progress buffer live here and nowhere
//! else.

use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Context, Result};
use ethers::types::{Address, U256};
use ethers::utils::format_units;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::sleep;

use crate::chain::{require_confirmed, wait_for_inclusion, ChainEndpoint, ConfirmOutcome};
use crate::fees::FeePolicy;
use crate::progress::ProgressStore;
use crate::retry::{BatchFailure, FatalKind, Next, RetryController};

#[derive(Debug, Clone)]
pub struct DistributeConfig {
    pub amount_per_recipient: U256,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub confirm_wait: Duration,
    pub batch_pause: Duration,
    pub backoff_step: Duration,
    pub decimals: u32,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunReport {
    pub already_done: usize,
    pub paid: usize,
    pub batches: usize,
}

/// Ordered partition of the eligible set into slices of at most `batch_size`.
pub fn plan_batches(eligible: &[Address], batch_size: usize) -> impl Iterator<Item = &[Address]> {
    eligible.chunks(batch_size)
}

pub struct Distributor<E> {
    endpoint: E,
    fees: FeePolicy,
    config: DistributeConfig,
}

impl<E: ChainEndpoint> Distributor<E> {
    pub fn new(endpoint: E, fees: FeePolicy, config: DistributeConfig) -> Self {
        Self {
            endpoint,
            fees,
            config,
        }
    }

    /// Runs the whole pipeline over `candidates`. Progress is force-flushed
    /// on the way out no matter how the run ends, so everything confirmed so
    /// far survives an abort.
    pub async fn run(
        &self,
        candidates: &[Address],
        progress: &mut ProgressStore,
    ) -> Result<RunReport> {
        ensure!(self.config.batch_size > 0, "batch size must be at least 1");
        ensure!(self.config.max_attempts > 0, "max attempts must be at least 1");

        let eligible: Vec<Address> = candidates
            .iter()
            .copied()
            .filter(|addr| !progress.contains(addr))
            .collect();
        let already_done = candidates.len() - eligible.len();
        if already_done > 0 {
            println!(
                "📊 {already_done}/{} candidates already settled",
                candidates.len()
            );
        }
        if eligible.is_empty() {
            println!("✅ Nothing to do: every candidate is already settled");
            return Ok(RunReport {
                already_done,
                paid: 0,
                batches: 0,
            });
        }
        println!("Recipients to process: {}", eligible.len());

        let run = self.run_batches(&eligible, progress).await;
        let flushed = progress.flush(true);
        let mut report = run?;
        flushed?;
        report.already_done = already_done;
        Ok(report)
    }

    async fn run_batches(
        &self,
        eligible: &[Address],
        progress: &mut ProgressStore,
    ) -> Result<RunReport> {
        let operator = self.endpoint.operator();
        let mut nonce = self
            .endpoint
            .next_nonce(operator)
            .await
            .context("failed to read the wallet nonce")?;

        let pb = ProgressBar::new(eligible.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} Distributing | ETA: {eta}")?
                .progress_chars("##-"),
        );

        let total_batches = eligible.len().div_ceil(self.config.batch_size);
        let mut paid = 0;
        let mut batches = 0;
        for (index, batch) in plan_batches(eligible, self.config.batch_size).enumerate() {
            pb.println(format!(
                "Batch {}/{total_batches} ({} recipients)",
                index + 1,
                batch.len()
            ));

            let required = U256::from(batch.len()) * self.config.amount_per_recipient;
            if self.ensure_contract_balance(required, &pb).await? {
                // The top-up transactions consumed wallet nonces.
                nonce = self
                    .endpoint
                    .next_nonce(operator)
                    .await
                    .context("failed to re-read the wallet nonce after the top-up")?;
            }

            self.settle_batch(batch, &mut nonce, &pb).await?;

            progress.record(batch);
            progress.flush(false)?;
            paid += batch.len();
            batches += 1;
            pb.inc(batch.len() as u64);

            // Short pause between batches.
            sleep(self.config.batch_pause).await;
        }
        pb.finish_with_message("all batches confirmed");

        Ok(RunReport {
            already_done: 0,
            paid,
            batches,
        })
    }

    /// Pre-submission guard: make sure the distribution contract can cover
    /// the batch, topping it up from the operator's own holdings if not.
    /// Returns whether a top-up happened. Any failure here is final; this
    /// path never feeds the retry machine.
    async fn ensure_contract_balance(&self, required: U256, pb: &ProgressBar) -> Result<bool> {
        let contract = self.endpoint.distribution_contract();
        let balance = self
            .endpoint
            .token_balance(contract)
            .await
            .context("failed to read the contract token balance")?;
        if balance >= required {
            return Ok(false);
        }

        let shortfall = required - balance;
        pb.println(format!(
            "⚠️  Contract holds {} tokens but the batch needs {}; transferring {} to it",
            format_units(balance, self.config.decimals)?,
            format_units(required, self.config.decimals)?,
            format_units(shortfall, self.config.decimals)?,
        ));

        let operator = self.endpoint.operator();
        let allowance = self
            .endpoint
            .allowance(operator, contract)
            .await
            .context("failed to read the top-up allowance")?;
        if allowance < shortfall {
            pb.println("Approving tokens for the top-up...".to_string());
            let tx = self
                .endpoint
                .approve(contract, shortfall)
                .await
                .map_err(|e| anyhow!("approval submission failed: {e}"))?;
            require_confirmed(&self.endpoint, tx, self.config.confirm_wait, "approval").await?;
        }

        let tx = self
            .endpoint
            .transfer_tokens(contract, shortfall)
            .await
            .map_err(|e| anyhow!("top-up transfer submission failed: {e}"))?;
        pb.println(format!("Top-up transfer submitted: {tx:#x}"));
        require_confirmed(&self.endpoint, tx, self.config.confirm_wait, "top-up transfer").await?;

        let after = self
            .endpoint
            .token_balance(contract)
            .await
            .context("failed to re-read the contract token balance")?;
        if after < required {
            bail!(
                "contract balance still short after the top-up: have {}, need {}",
                format_units(after, self.config.decimals)?,
                format_units(required, self.config.decimals)?,
            );
        }
        pb.println(format!(
            "✅ Contract recharged; balance now {}",
            format_units(after, self.config.decimals)?
        ));
        Ok(true)
    }

    /// Drives one batch to a terminal state: submit, wait, classify, and
    /// either resubmit per the retry decision or give up.
    async fn settle_batch(
        &self,
        batch: &[Address],
        nonce: &mut U256,
        pb: &ProgressBar,
    ) -> Result<()> {
        let operator = self.endpoint.operator();
        let mut retry = RetryController::new(self.config.max_attempts, self.config.backoff_step);
        loop {
            let quote = self.fees.quote(retry.attempt());
            let attempt_nonce = *nonce;
            *nonce = attempt_nonce + U256::one();

            let failure = match self
                .endpoint
                .submit_airdrop(batch, attempt_nonce, &quote)
                .await
            {
                Ok(tx) => {
                    pb.println(format!(
                        "Submitted {tx:#x} (nonce {attempt_nonce}, {} wei/gas)",
                        quote.max_fee_per_gas
                    ));
                    match wait_for_inclusion(&self.endpoint, tx, self.config.confirm_wait).await {
                        Ok(ConfirmOutcome::Confirmed { gas_used }) => {
                            pb.println(format!("✅ Confirmed {tx:#x} (gas used {gas_used})"));
                            return Ok(());
                        }
                        Ok(ConfirmOutcome::Reverted) => BatchFailure::Reverted,
                        Ok(ConfirmOutcome::TimedOut) => BatchFailure::Unconfirmed,
                        Err(e) => BatchFailure::Endpoint(e.to_string()),
                    }
                }
                Err(e) => BatchFailure::Submit(e),
            };
            pb.println(format!(
                "❌ Attempt {} failed: {failure}",
                retry.attempt() + 1
            ));

            match retry.after_failure(&failure) {
                Next::RefreshNonce => {
                    *nonce = self
                        .endpoint
                        .next_nonce(operator)
                        .await
                        .context("failed to refresh the wallet nonce")?;
                    pb.println(format!("Refreshed nonce to {nonce}"));
                }
                Next::Backoff(delay) => sleep(delay).await,
                Next::Fatal(FatalKind::OperatorFunds) => {
                    let native = self
                        .endpoint
                        .native_balance(operator)
                        .await
                        .unwrap_or_default();
                    bail!(
                        "operator wallet cannot cover gas (native balance {native} wei): {failure}"
                    );
                }
                Next::Fatal(FatalKind::AttemptsExhausted) => {
                    bail!(
                        "batch failed after {} attempts: {failure}",
                        self.config.max_attempts
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainEndpoint, SubmitError, TxStatus};
    use crate::fees::FeeQuote;
    use async_trait::async_trait;
    use ethers::types::H256;
    use std::collections::{HashMap, VecDeque};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const AMOUNT: u64 = 5;

    #[derive(Debug, Clone)]
    struct Submission {
        recipients: Vec<Address>,
        nonce: U256,
        max_fee: U256,
    }

    enum SubmitScript {
        Accept,
        AcceptReverting,
        Reject(SubmitError),
    }

    struct FakeState {
        chain_nonce: u64,
        contract_tokens: U256,
        operator_tokens: U256,
        allowance: U256,
        script: VecDeque<SubmitScript>,
        submissions: Vec<Submission>,
        approvals: Vec<(Address, U256)>,
        transfers: Vec<(Address, U256)>,
        statuses: HashMap<H256, TxStatus>,
        hash_counter: u64,
        fail_top_up: bool,
    }

    /// In-memory chain: confirms accepted transactions instantly and replays
    /// a per-submission script of rejections.
    struct FakeChain {
        operator: Address,
        contract: Address,
        state: Mutex<FakeState>,
    }

    impl FakeChain {
        fn new(contract_tokens: u64) -> Self {
            Self {
                operator: Address::from_low_u64_be(0xAA),
                contract: Address::from_low_u64_be(0xCC),
                state: Mutex::new(FakeState {
                    chain_nonce: 7,
                    contract_tokens: U256::from(contract_tokens),
                    operator_tokens: U256::from(1_000_000u64),
                    allowance: U256::zero(),
                    script: VecDeque::new(),
                    submissions: Vec::new(),
                    approvals: Vec::new(),
                    transfers: Vec::new(),
                    statuses: HashMap::new(),
                    hash_counter: 0,
                    fail_top_up: false,
                }),
            }
        }

        fn scripted(mut self, steps: Vec<SubmitScript>) -> Self {
            self.state.get_mut().unwrap().script = steps.into();
            self
        }

        fn failing_top_up(mut self) -> Self {
            self.state.get_mut().unwrap().fail_top_up = true;
            self
        }

        fn submissions(&self) -> Vec<Submission> {
            self.state.lock().unwrap().submissions.clone()
        }

        fn approvals(&self) -> Vec<(Address, U256)> {
            self.state.lock().unwrap().approvals.clone()
        }

        fn transfers(&self) -> Vec<(Address, U256)> {
            self.state.lock().unwrap().transfers.clone()
        }

        fn contract_tokens(&self) -> U256 {
            self.state.lock().unwrap().contract_tokens
        }

        fn mint_hash(state: &mut FakeState, status: TxStatus) -> H256 {
            state.hash_counter += 1;
            let hash = H256::from_low_u64_be(state.hash_counter);
            state.statuses.insert(hash, status);
            hash
        }
    }

    #[async_trait]
    impl ChainEndpoint for FakeChain {
        fn operator(&self) -> Address {
            self.operator
        }

        fn distribution_contract(&self) -> Address {
            self.contract
        }

        async fn token_balance(&self, holder: Address) -> Result<U256> {
            let state = self.state.lock().unwrap();
            Ok(if holder == self.contract {
                state.contract_tokens
            } else if holder == self.operator {
                state.operator_tokens
            } else {
                U256::zero()
            })
        }

        async fn token_total_supply(&self) -> Result<U256> {
            Ok(U256::from(10_000_000u64))
        }

        async fn native_balance(&self, _account: Address) -> Result<U256> {
            Ok(U256::from(42u64))
        }

        async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256> {
            Ok(self.state.lock().unwrap().allowance)
        }

        async fn next_nonce(&self, _account: Address) -> Result<U256> {
            Ok(U256::from(self.state.lock().unwrap().chain_nonce))
        }

        async fn approve(&self, spender: Address, amount: U256) -> Result<H256, SubmitError> {
            let mut state = self.state.lock().unwrap();
            state.allowance = amount;
            state.approvals.push((spender, amount));
            state.chain_nonce += 1;
            Ok(Self::mint_hash(
                &mut state,
                TxStatus::Succeeded {
                    gas_used: U256::from(46_000u64),
                },
            ))
        }

        async fn transfer_tokens(&self, to: Address, amount: U256) -> Result<H256, SubmitError> {
            let mut state = self.state.lock().unwrap();
            state.transfers.push((to, amount));
            state.chain_nonce += 1;
            if state.fail_top_up {
                return Ok(Self::mint_hash(&mut state, TxStatus::Reverted));
            }
            state.operator_tokens -= amount;
            if to == self.contract {
                state.contract_tokens += amount;
            }
            Ok(Self::mint_hash(
                &mut state,
                TxStatus::Succeeded {
                    gas_used: U256::from(52_000u64),
                },
            ))
        }

        async fn submit_airdrop(
            &self,
            recipients: &[Address],
            nonce: U256,
            fees: &FeeQuote,
        ) -> Result<H256, SubmitError> {
            let mut state = self.state.lock().unwrap();
            state.submissions.push(Submission {
                recipients: recipients.to_vec(),
                nonce,
                max_fee: fees.max_fee_per_gas,
            });
            match state.script.pop_front().unwrap_or(SubmitScript::Accept) {
                SubmitScript::Accept => {
                    state.chain_nonce = nonce.as_u64() + 1;
                    state.contract_tokens = state.contract_tokens
                        - U256::from(recipients.len()) * U256::from(AMOUNT);
                    Ok(Self::mint_hash(
                        &mut state,
                        TxStatus::Succeeded {
                            gas_used: U256::from(100_000u64),
                        },
                    ))
                }
                SubmitScript::AcceptReverting => {
                    state.chain_nonce = nonce.as_u64() + 1;
                    Ok(Self::mint_hash(&mut state, TxStatus::Reverted))
                }
                SubmitScript::Reject(err) => Err(err),
            }
        }

        async fn transaction_status(&self, tx: H256) -> Result<TxStatus> {
            Ok(self
                .state
                .lock()
                .unwrap()
                .statuses
                .get(&tx)
                .copied()
                .unwrap_or(TxStatus::Pending))
        }
    }

    fn addrs(n: usize) -> Vec<Address> {
        (1..=n)
            .map(|i| Address::from_low_u64_be(i as u64 + 0x1000))
            .collect()
    }

    fn distributor_sized(chain: FakeChain, batch_size: usize) -> Distributor<FakeChain> {
        Distributor::new(
            chain,
            FeePolicy::new(627, 1, 8_500_000),
            DistributeConfig {
                amount_per_recipient: U256::from(AMOUNT),
                batch_size,
                max_attempts: 3,
                confirm_wait: Duration::from_secs(30),
                batch_pause: Duration::ZERO,
                backoff_step: Duration::ZERO,
                decimals: 0,
            },
        )
    }

    fn distributor(chain: FakeChain) -> Distributor<FakeChain> {
        distributor_sized(chain, 300)
    }

    fn store(dir: &TempDir) -> ProgressStore {
        ProgressStore::load(dir.path().join("holders.json"), 1000).unwrap()
    }

    #[tokio::test]
    async fn all_candidates_settled_means_zero_submissions_and_success() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(4);
        let mut progress = store(&dir);
        progress.record(&candidates);
        progress.flush(true).unwrap();

        let mut progress = store(&dir);
        let d = distributor(FakeChain::new(1_000_000));
        let report = d.run(&candidates, &mut progress).await.unwrap();

        assert_eq!(
            report,
            RunReport {
                already_done: 4,
                paid: 0,
                batches: 0
            }
        );
        assert!(d.endpoint.submissions().is_empty());
    }

    #[tokio::test]
    async fn six_hundred_fifty_recipients_make_three_ordered_batches() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(650);
        let mut progress = store(&dir);

        let d = distributor(FakeChain::new(1_000_000));
        let report = d.run(&candidates, &mut progress).await.unwrap();

        assert_eq!(report.paid, 650);
        assert_eq!(report.batches, 3);

        let subs = d.endpoint.submissions();
        assert_eq!(subs.len(), 3);
        assert_eq!(
            subs.iter().map(|s| s.recipients.len()).collect::<Vec<_>>(),
            vec![300, 300, 50]
        );
        // Consecutive nonces in submission order.
        assert_eq!(
            subs.iter().map(|s| s.nonce).collect::<Vec<_>>(),
            vec![U256::from(7u64), U256::from(8u64), U256::from(9u64)]
        );
        // Union of the batches is the eligible set, in order, no duplicates.
        let flattened: Vec<Address> = subs.iter().flat_map(|s| s.recipients.clone()).collect();
        assert_eq!(flattened, candidates);

        let reloaded = store(&dir);
        assert_eq!(reloaded.done_count(), 650);
    }

    #[tokio::test]
    async fn nonce_conflict_refreshes_the_cursor_and_escalates_the_fee() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(9);
        let mut progress = store(&dir);

        let chain = FakeChain::new(1_000_000).scripted(vec![
            SubmitScript::Accept,
            SubmitScript::Reject(SubmitError::NonceConflict("nonce too low".into())),
            SubmitScript::Accept,
            SubmitScript::Accept,
        ]);
        let d = distributor_sized(chain, 3);
        d.run(&candidates, &mut progress).await.unwrap();

        let subs = d.endpoint.submissions();
        assert_eq!(subs.len(), 4);
        // The rejected attempt and its retry target the same refreshed nonce.
        assert_eq!(subs[1].nonce, U256::from(8u64));
        assert_eq!(subs[2].nonce, U256::from(8u64));
        assert!(subs[2].max_fee > subs[1].max_fee);
        // The third batch continues from the cursor as if nothing happened.
        assert_eq!(subs[3].nonce, U256::from(9u64));
        assert_eq!(subs[3].max_fee, subs[0].max_fee);

        // Every candidate is recorded exactly once despite the retry.
        let entries: Vec<String> = serde_json::from_str(
            &fs::read_to_string(dir.path().join("holders.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(entries.len(), 9);
        let mut unique = entries.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 9);
    }

    #[tokio::test]
    async fn reverted_batches_are_resubmitted_with_a_higher_fee() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(3);
        let mut progress = store(&dir);

        let chain = FakeChain::new(1_000_000)
            .scripted(vec![SubmitScript::AcceptReverting, SubmitScript::Accept]);
        let d = distributor(chain);
        d.run(&candidates, &mut progress).await.unwrap();

        let subs = d.endpoint.submissions();
        assert_eq!(subs.len(), 2);
        assert!(subs[1].max_fee > subs[0].max_fee);
        // The reverted transaction consumed its nonce on chain, so the
        // resubmission moves on to the next one without a refresh.
        assert_eq!(subs[1].nonce, subs[0].nonce + U256::one());
    }

    #[tokio::test]
    async fn shortfall_triggers_a_top_up_before_the_first_submission() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(3);
        let mut progress = store(&dir);

        // Needs 15, holds 2.
        let d = distributor(FakeChain::new(2));
        d.run(&candidates, &mut progress).await.unwrap();

        let shortfall = U256::from(13u64);
        assert_eq!(d.endpoint.approvals(), vec![(d.endpoint.contract, shortfall)]);
        assert_eq!(d.endpoint.transfers(), vec![(d.endpoint.contract, shortfall)]);

        let subs = d.endpoint.submissions();
        assert_eq!(subs.len(), 1);
        // Approval and transfer each consumed a wallet nonce; the cursor was
        // re-synced before the batch went out.
        assert_eq!(subs[0].nonce, U256::from(9u64));
        // 2 + 13 topped up, 15 distributed.
        assert_eq!(d.endpoint.contract_tokens(), U256::zero());
    }

    #[tokio::test]
    async fn failed_top_up_aborts_without_touching_progress() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(3);
        let mut progress = store(&dir);

        let d = distributor(FakeChain::new(0).failing_top_up());
        let err = d.run(&candidates, &mut progress).await.unwrap_err();
        assert!(err.to_string().contains("reverted"), "got: {err}");

        assert!(d.endpoint.submissions().is_empty());
        assert!(!dir.path().join("holders.json").exists());
    }

    #[tokio::test]
    async fn retry_budget_exhaustion_aborts_but_keeps_confirmed_batches() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(6);
        let mut progress = store(&dir);

        let chain = FakeChain::new(1_000_000).scripted(vec![
            SubmitScript::Accept,
            SubmitScript::Reject(SubmitError::Network("connection reset".into())),
            SubmitScript::Reject(SubmitError::Network("connection reset".into())),
            SubmitScript::Reject(SubmitError::Network("connection reset".into())),
        ]);
        let d = distributor_sized(chain, 3);
        let err = d.run(&candidates, &mut progress).await.unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"), "got: {err}");

        // One success plus exactly three attempts for the doomed batch.
        assert_eq!(d.endpoint.submissions().len(), 4);

        // The first batch was below the flush threshold, so only the forced
        // flush on abort can have persisted it.
        let reloaded = store(&dir);
        assert_eq!(reloaded.done_count(), 3);
        for addr in &candidates[..3] {
            assert!(reloaded.contains(addr));
        }
        for addr in &candidates[3..] {
            assert!(!reloaded.contains(addr));
        }
    }

    #[tokio::test]
    async fn operator_fund_exhaustion_is_fatal_without_retries() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(2);
        let mut progress = store(&dir);

        let chain = FakeChain::new(1_000_000).scripted(vec![SubmitScript::Reject(
            SubmitError::InsufficientFunds("insufficient funds for gas * price + value".into()),
        )]);
        let d = distributor(chain);
        let err = d.run(&candidates, &mut progress).await.unwrap_err();
        assert!(err.to_string().contains("cannot cover gas"), "got: {err}");
        assert!(err.to_string().contains("42 wei"), "got: {err}");
        assert_eq!(d.endpoint.submissions().len(), 1);
    }

    #[tokio::test]
    async fn a_second_run_over_the_same_input_submits_nothing() {
        let dir = TempDir::new().unwrap();
        let candidates = addrs(10);

        let mut progress = store(&dir);
        let first = distributor(FakeChain::new(1_000_000));
        first.run(&candidates, &mut progress).await.unwrap();
        assert_eq!(first.endpoint.submissions().len(), 1);

        let mut progress = store(&dir);
        let second = distributor(FakeChain::new(1_000_000));
        let report = second.run(&candidates, &mut progress).await.unwrap();
        assert_eq!(report.paid, 0);
        assert_eq!(report.already_done, 10);
        assert!(second.endpoint.submissions().is_empty());
    }

    #[test]
    fn planned_batches_respect_the_size_bound_and_cover_everything() {
        let eligible = addrs(650);
        let batches: Vec<&[Address]> = plan_batches(&eligible, 300).collect();
        assert!(batches.iter().all(|b| b.len() <= 300));
        assert_eq!(
            batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
            vec![300, 300, 50]
        );
        let flattened: Vec<Address> = batches.concat();
        assert_eq!(flattened, eligible);
    }
}
