//! Call batching.
//!
//! Price updates always precede the action they guard. The assembler only
//! concatenates; it never reorders or deduplicates.

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;
use smallvec::SmallVec;

use crate::contracts::{IMulticall, MulticallAction};

/// One call in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallAction {
    pub target: Address,
    /// Informational for the contract's accounting; ordering is enforced here
    pub is_price_update: bool,
    pub payload: Bytes,
}

impl From<CallAction> for MulticallAction {
    fn from(call: CallAction) -> Self {
        MulticallAction {
            target: call.target,
            isPriceUpdate: call.is_price_update,
            data: call.payload,
        }
    }
}

/// Usually one price update plus the action.
pub type CallBatch = SmallVec<[CallAction; 2]>;

/// What gets sent to the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Single { target: Address, data: Bytes },
    Multicall { entry_point: Address, calls: CallBatch },
}

impl Submission {
    /// Address the transaction is sent to.
    pub fn to(&self) -> Address {
        match self {
            Self::Single { target, .. } => *target,
            Self::Multicall { entry_point, .. } => *entry_point,
        }
    }

    /// Transaction input.
    pub fn calldata(&self) -> Bytes {
        match self {
            Self::Single { data, .. } => data.clone(),
            Self::Multicall { calls, .. } => {
                let call = IMulticall::multicallCall {
                    calls: calls.iter().cloned().map(MulticallAction::from).collect(),
                };
                call.abi_encode().into()
            }
        }
    }

    pub fn is_batched(&self) -> bool {
        matches!(self, Self::Multicall { .. })
    }

    /// Number of price-update calls carried.
    pub fn price_update_count(&self) -> usize {
        match self {
            Self::Single { .. } => 0,
            Self::Multicall { calls, .. } => calls.iter().filter(|c| c.is_price_update).count(),
        }
    }
}

/// Builds call records and batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct MulticallAssembler;

impl MulticallAssembler {
    pub fn build_action(target: Address, calldata: impl Into<Bytes>) -> CallAction {
        CallAction {
            target,
            is_price_update: false,
            payload: calldata.into(),
        }
    }

    pub fn build_price_update(target: Address, payload: impl Into<Bytes>) -> CallAction {
        CallAction {
            target,
            is_price_update: true,
            payload: payload.into(),
        }
    }

    /// `price_updates ++ [action]`, sent to `entry_point`.
    pub fn assemble(
        entry_point: Address,
        price_updates: impl IntoIterator<Item = CallAction>,
        action: CallAction,
    ) -> Submission {
        let mut calls: CallBatch = price_updates.into_iter().collect();
        calls.push(action);
        Submission::Multicall { entry_point, calls }
    }

    /// Bare action without a batch wrapper.
    pub fn single(action: CallAction) -> Submission {
        Submission::Single {
            target: action.target,
            data: action.payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oracle() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn market() -> Address {
        Address::repeat_byte(0xbb)
    }

    #[test]
    fn test_assemble_keeps_order() {
        let update = MulticallAssembler::build_price_update(oracle(), vec![0x01]);
        let action = MulticallAssembler::build_action(market(), vec![0x02]);

        let submission = MulticallAssembler::assemble(market(), [update.clone()], action.clone());

        match &submission {
            Submission::Multicall { entry_point, calls } => {
                assert_eq!(*entry_point, market());
                assert_eq!(calls.as_slice(), &[update, action]);
                assert!(calls[0].is_price_update);
                assert!(!calls[1].is_price_update);
            }
            other => panic!("expected multicall, got {:?}", other),
        }
        assert_eq!(submission.price_update_count(), 1);
        assert_eq!(submission.to(), market());
    }

    #[test]
    fn test_assemble_without_updates() {
        let action = MulticallAssembler::build_action(market(), vec![0x02]);
        let submission = MulticallAssembler::assemble(market(), [], action);
        assert!(submission.is_batched());
        assert_eq!(submission.price_update_count(), 0);
    }

    #[test]
    fn test_single_calldata_is_action_payload() {
        let action = MulticallAssembler::build_action(market(), vec![0xde, 0xad]);
        let submission = MulticallAssembler::single(action);
        assert!(!submission.is_batched());
        assert_eq!(submission.to(), market());
        assert_eq!(submission.calldata(), Bytes::from(vec![0xde, 0xad]));
    }

    #[test]
    fn test_multicall_calldata_decodes_in_order() {
        let submission = MulticallAssembler::assemble(
            market(),
            [MulticallAssembler::build_price_update(oracle(), vec![0x01])],
            MulticallAssembler::build_action(market(), vec![0x02]),
        );

        let data = submission.calldata();
        assert_eq!(&data[..4], &IMulticall::multicallCall::SELECTOR);

        let decoded = IMulticall::multicallCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded.calls.len(), 2);
        assert_eq!(decoded.calls[0].target, oracle());
        assert!(decoded.calls[0].isPriceUpdate);
        assert_eq!(decoded.calls[1].target, market());
        assert_eq!(decoded.calls[1].data, Bytes::from(vec![0x02]));
    }
}
