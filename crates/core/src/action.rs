//! State-changing market actions and their call encoding.
//!
//! Amounts here are already integer on-chain units; conversion from decimal
//! input happens in the client before an action is built.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use lending_sdk_api::SwapQuote;
use lending_sdk_chain::contracts::{
    DeleverageAction, IBorrowableCToken, ICToken, IERC20, IPositionManagement, IZapper,
    LeverageAction, Swap,
};
use lending_sdk_chain::{CallAction, MulticallAssembler};

use crate::fixed_point::basis_points_to_wad;

/// One logical action against a market.
///
/// `Leverage` and `Deleverage` act on the borrowable (debt) market and name
/// the collateral market explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Deposit {
        assets: U256,
        receiver: Address,
    },
    Redeem {
        shares: U256,
        receiver: Address,
        owner: Address,
    },
    Borrow {
        assets: U256,
        receiver: Address,
    },
    Repay {
        assets: U256,
    },
    /// Swap into the market's underlying and deposit in one call
    Zap {
        zapper: Address,
        swaps: Vec<Swap>,
        expected_shares: U256,
        receiver: Address,
        deposit_as_wrapped_native: bool,
        /// Native amount forwarded with the call
        value: U256,
    },
    Leverage {
        position_manager: Address,
        collateral: Address,
        borrow_assets: U256,
        swap: Swap,
        expected_shares: U256,
        /// WAD
        slippage: U256,
    },
    Deleverage {
        position_manager: Address,
        collateral: Address,
        collateral_assets: U256,
        repay_assets: U256,
        swaps: Vec<Swap>,
        /// WAD
        slippage: U256,
    },
    /// ERC20 allowance for `spender` on `token`
    Approve {
        token: Address,
        spender: Address,
        amount: U256,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deposit { .. } => "deposit",
            Self::Redeem { .. } => "redeem",
            Self::Borrow { .. } => "borrow",
            Self::Repay { .. } => "repay",
            Self::Zap { .. } => "zap",
            Self::Leverage { .. } => "leverage",
            Self::Deleverage { .. } => "deleverage",
            Self::Approve { .. } => "approve",
        }
    }

    /// Whether the acting market must be a borrowable one.
    pub fn requires_borrowable(&self) -> bool {
        matches!(
            self,
            Self::Borrow { .. } | Self::Repay { .. } | Self::Leverage { .. } | Self::Deleverage { .. }
        )
    }

    /// Whether the action reads the market's price on-chain. ERC20 approvals
    /// never touch the market.
    pub fn reads_market_price(&self) -> bool {
        !matches!(self, Self::Approve { .. })
    }

    /// Contract the action call is sent to.
    pub fn target(&self, market: Address) -> Address {
        match self {
            Self::Deposit { .. } | Self::Redeem { .. } | Self::Borrow { .. } | Self::Repay { .. } => {
                market
            }
            Self::Zap { zapper, .. } => *zapper,
            Self::Leverage { position_manager, .. } | Self::Deleverage { position_manager, .. } => {
                *position_manager
            }
            Self::Approve { token, .. } => *token,
        }
    }

    /// Native value attached to the transaction.
    pub fn value(&self) -> U256 {
        match self {
            Self::Zap { value, .. } => *value,
            _ => U256::ZERO,
        }
    }

    /// ABI-encoded call for the acting `market`.
    pub fn calldata(&self, market: Address) -> Bytes {
        let encoded = match self {
            Self::Deposit { assets, receiver } => ICToken::depositCall {
                assets: *assets,
                receiver: *receiver,
            }
            .abi_encode(),
            Self::Redeem { shares, receiver, owner } => ICToken::redeemCall {
                shares: *shares,
                receiver: *receiver,
                owner: *owner,
            }
            .abi_encode(),
            Self::Borrow { assets, receiver } => IBorrowableCToken::borrowCall {
                assets: *assets,
                receiver: *receiver,
            }
            .abi_encode(),
            Self::Repay { assets } => IBorrowableCToken::repayCall { assets: *assets }.abi_encode(),
            Self::Zap {
                swaps,
                expected_shares,
                receiver,
                deposit_as_wrapped_native,
                ..
            } => IZapper::swapAndDepositCall {
                cToken: market,
                depositAsWrappedNative: *deposit_as_wrapped_native,
                swaps: swaps.clone(),
                expectedShares: *expected_shares,
                receiver: *receiver,
            }
            .abi_encode(),
            Self::Leverage {
                collateral,
                borrow_assets,
                swap,
                expected_shares,
                slippage,
                ..
            } => IPositionManagement::leverageCall {
                action: LeverageAction {
                    borrowableCToken: market,
                    borrowAssets: *borrow_assets,
                    cToken: *collateral,
                    swapAction: swap.clone(),
                    expectedShares: *expected_shares,
                },
                slippage: *slippage,
            }
            .abi_encode(),
            Self::Deleverage {
                collateral,
                collateral_assets,
                repay_assets,
                swaps,
                slippage,
                ..
            } => IPositionManagement::deleverageCall {
                action: DeleverageAction {
                    cToken: *collateral,
                    collateralAssets: *collateral_assets,
                    borrowableCToken: market,
                    repayAssets: *repay_assets,
                    swapActions: swaps.clone(),
                },
                slippage: *slippage,
            }
            .abi_encode(),
            Self::Approve { spender, amount, .. } => IERC20::approveCall {
                spender: *spender,
                amount: *amount,
            }
            .abi_encode(),
        };
        encoded.into()
    }

    /// The action as a call record.
    pub fn encode(&self, market: Address) -> CallAction {
        MulticallAssembler::build_action(self.target(market), self.calldata(market))
    }
}

/// Swap instruction for the zapper or position manager from an aggregator quote.
pub fn swap_from_quote(quote: &SwapQuote, slippage_bps: u32) -> Swap {
    Swap {
        inputToken: quote.token_in,
        inputAmount: quote.amount_in,
        outputToken: quote.token_out,
        target: quote.router,
        slippage: basis_points_to_wad(slippage_bps),
        call: quote.calldata.clone(),
    }
}
