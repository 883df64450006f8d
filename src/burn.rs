//! One-off supply burn: moves 1% of the token's total supply from the
//! operator wallet to the zero address.

use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use ethers::types::{Address, U256};
use ethers::utils::format_units;

use crate::chain::{require_confirmed, ChainEndpoint};

pub async fn run<E: ChainEndpoint>(
    endpoint: &E,
    confirm_wait: Duration,
    decimals: u32,
) -> Result<()> {
    let burn_address = Address::zero();
    let operator = endpoint.operator();

    let total_supply = endpoint.token_total_supply().await?;
    println!(
        "Total supply: {} tokens",
        format_units(total_supply, decimals)?
    );

    let to_burn = total_supply / U256::from(100u64);
    println!(
        "Amount to burn (1%): {} tokens",
        format_units(to_burn, decimals)?
    );

    let balance = endpoint.token_balance(operator).await?;
    println!("Operator balance: {} tokens", format_units(balance, decimals)?);
    if balance < to_burn {
        bail!(
            "insufficient balance to burn 1% of supply (have {}, need {})",
            format_units(balance, decimals)?,
            format_units(to_burn, decimals)?,
        );
    }

    let allowance = endpoint.allowance(operator, burn_address).await?;
    if allowance < to_burn {
        println!("Approving tokens for burn...");
        let tx = endpoint
            .approve(burn_address, to_burn)
            .await
            .map_err(|e| anyhow!("approval failed: {e}"))?;
        require_confirmed(endpoint, tx, confirm_wait, "approval").await?;
        println!("Approval confirmed");
    }

    println!("Sending tokens to the burn address...");
    let tx = endpoint
        .transfer_tokens(burn_address, to_burn)
        .await
        .map_err(|e| anyhow!("burn transfer failed: {e}"))?;
    println!("Transaction submitted: {tx:#x}");

    let gas_used = require_confirmed(endpoint, tx, confirm_wait, "burn transfer").await?;
    println!("Transaction confirmed! Gas used: {gas_used}");

    let burned = endpoint.token_balance(burn_address).await?;
    println!(
        "Burn address balance: {} tokens",
        format_units(burned, decimals)?
    );
    Ok(())
}
