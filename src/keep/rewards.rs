//! Member rewards.
//!
//! Rewards are split evenly between the members, with the remainder going to
//! the last one, and accumulate until someone withdraws them to the member's
//! beneficiary. Anybody may trigger a withdrawal; the value only ever goes to
//! the beneficiary.
use tracing::{debug, info, warn};

use super::{Keep, KeepEvent, KeepState};
use crate::collaborators::ValueSink;
use crate::error::{BondingError, KeepError};
use crate::ledger::BondingLedger;
use crate::primitives::{Address, Amount, Asset};

fn balance(state: &KeepState, asset: Asset, member: Address) -> Amount {
    let balance = match asset {
        Asset::Native => state.eth_balances.get(&member),
        Asset::Token(token) => state.token_balances.get(&(token, member)),
    };
    balance.copied().unwrap_or(0)
}

fn set_balance(state: &mut KeepState, asset: Asset, member: Address, amount: Amount) {
    match asset {
        Asset::Native => {
            state.eth_balances.insert(member, amount);
        }
        Asset::Token(token) => {
            state.token_balances.insert((token, member), amount);
        }
    }
}

impl Keep {
    fn credit_members(&mut self, asset: Asset, amount: Amount) -> Result<(), KeepError> {
        let state = self.state()?;
        let mut updated = Vec::with_capacity(state.members.len());
        for (member, share) in state
            .members
            .split(amount)
            .ok_or(KeepError::DividendMustBeNonzero)?
        {
            let total = balance(state, asset, member)
                .checked_add(share)
                .ok_or(KeepError::Overflow)?;
            updated.push((member, total));
        }

        let state = self.state_mut()?;
        for (member, total) in updated {
            set_balance(state, asset, member, total);
        }
        Ok(())
    }

    /// Split `amount` of native value between the members.
    pub fn distribute_eth_reward(&mut self, amount: Amount) -> Result<(), KeepError> {
        self.credit_members(Asset::Native, amount)?;
        self.emit(KeepEvent::EthRewardDistributed { amount })?;
        info!(keep = %self.address, amount, "reward distributed");
        Ok(())
    }

    /// Split `amount` of `token` between the members.
    pub fn distribute_erc20_reward(&mut self, token: Address, amount: Amount) -> Result<(), KeepError> {
        self.credit_members(Asset::Token(token), amount)?;
        self.emit(KeepEvent::Erc20RewardDistributed { token, amount })?;
        info!(keep = %self.address, %token, amount, "token reward distributed");
        Ok(())
    }

    pub fn member_eth_balance(&self, member: Address) -> Result<Amount, KeepError> {
        Ok(balance(self.state()?, Asset::Native, member))
    }

    pub fn member_token_balance(&self, token: Address, member: Address) -> Result<Amount, KeepError> {
        Ok(balance(self.state()?, Asset::Token(token), member))
    }

    /// Send the member's native rewards to their beneficiary.
    pub fn withdraw(
        &mut self,
        member: Address,
        ledger: &BondingLedger,
        sink: &mut dyn ValueSink,
    ) -> Result<(), KeepError> {
        self.pay_out(Asset::Native, member, ledger, sink)
    }

    /// Send the member's `token` rewards to their beneficiary.
    pub fn withdraw_erc20(
        &mut self,
        member: Address,
        token: Address,
        ledger: &BondingLedger,
        sink: &mut dyn ValueSink,
    ) -> Result<(), KeepError> {
        self.pay_out(Asset::Token(token), member, ledger, sink)
    }

    fn pay_out(
        &mut self,
        asset: Asset,
        member: Address,
        ledger: &BondingLedger,
        sink: &mut dyn ValueSink,
    ) -> Result<(), KeepError> {
        let amount = balance(self.state()?, asset, member);
        if amount == 0 {
            return Err(KeepError::NoFundsToWithdraw);
        }
        let beneficiary = ledger
            .beneficiary_of(member)
            .ok_or(BondingError::NoBeneficiary(member))?;

        set_balance(self.state_mut()?, asset, member, 0);
        if let Err(e) = sink.send(asset, beneficiary, amount, ledger) {
            warn!(keep = %self.address, %member, %beneficiary, amount, "reward transfer failed");
            set_balance(self.state_mut()?, asset, member, amount);
            return Err(BondingError::from(e).into());
        }
        debug!(keep = %self.address, %member, %beneficiary, amount, "reward withdrawn");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;

    use super::super::fixture::*;
    use super::*;
    use crate::config::KeepConfig;
    use crate::testing::RecordingSink;

    const TOKEN: u64 = 3000;

    #[test]
    fn test_split_sends_remainder_to_last_member() {
        let mut fx = open(3, 10, KeepConfig::default());
        fx.keep.distribute_eth_reward(1000).unwrap();
        assert_eq!(fx.keep.member_eth_balance(member(0)).unwrap(), 333);
        assert_eq!(fx.keep.member_eth_balance(member(1)).unwrap(), 333);
        assert_eq!(fx.keep.member_eth_balance(member(2)).unwrap(), 334);

        assert_eq!(
            fx.keep.distribute_eth_reward(2).unwrap_err(),
            KeepError::DividendMustBeNonzero
        );
        assert_eq!(fx.keep.member_eth_balance(member(2)).unwrap(), 334);
    }

    #[test]
    fn test_rewards_accumulate_after_close() {
        let mut fx = open(2, 10, KeepConfig::default());
        fx.keep.close_keep(addr(OWNER), &mut fx.ledger).unwrap();
        fx.keep.distribute_eth_reward(10).unwrap();
        fx.keep.distribute_eth_reward(10).unwrap();
        assert_eq!(fx.keep.member_eth_balance(member(0)).unwrap(), 10);
    }

    #[test]
    fn test_token_rewards_are_kept_apart() {
        let mut fx = open(2, 10, KeepConfig::default());
        let token = addr(TOKEN);
        fx.keep.distribute_erc20_reward(token, 7).unwrap();
        assert_eq!(fx.keep.member_token_balance(token, member(0)).unwrap(), 3);
        assert_eq!(fx.keep.member_token_balance(token, member(1)).unwrap(), 4);
        assert_eq!(fx.keep.member_eth_balance(member(1)).unwrap(), 0);
        assert_eq!(
            fx.keep.events().last(),
            Some(&KeepEvent::Erc20RewardDistributed { token, amount: 7 })
        );

        let mut sink = RecordingSink::default();
        fx.keep
            .withdraw_erc20(member(1), token, &fx.ledger, &mut sink)
            .unwrap();
        assert_eq!(sink.transfers()[0].asset, Asset::Token(token));
        assert_eq!(sink.total_to(beneficiary(1)), 4);
        assert_eq!(fx.keep.member_token_balance(token, member(1)).unwrap(), 0);
    }

    #[test]
    fn test_withdraw() {
        let mut fx = open(2, 10, KeepConfig::default());
        let mut sink = RecordingSink::default();
        assert_eq!(
            fx.keep.withdraw(member(0), &fx.ledger, &mut sink).unwrap_err(),
            KeepError::NoFundsToWithdraw
        );

        fx.keep.distribute_eth_reward(100).unwrap();
        fx.keep.withdraw(member(0), &fx.ledger, &mut sink).unwrap();
        assert_eq!(sink.total_to(beneficiary(0)), 50);
        assert_eq!(fx.keep.member_eth_balance(member(0)).unwrap(), 0);
        assert_eq!(
            fx.keep.withdraw(member(0), &fx.ledger, &mut sink).unwrap_err(),
            KeepError::NoFundsToWithdraw
        );
    }

    #[test]
    fn test_failed_withdrawal_only_restores_that_member() {
        let mut fx = open(2, 10, KeepConfig::default());
        let mut sink = RecordingSink::default().rejecting(beneficiary(1));
        fx.keep.distribute_eth_reward(100).unwrap();

        fx.keep.withdraw(member(0), &fx.ledger, &mut sink).unwrap();
        let err = fx.keep.withdraw(member(1), &fx.ledger, &mut sink).unwrap_err();
        assert_eq!(err.code(), "TransferFailed");
        assert_eq!(fx.keep.member_eth_balance(member(0)).unwrap(), 0);
        assert_eq!(fx.keep.member_eth_balance(member(1)).unwrap(), 50);

        sink.accept(beneficiary(1));
        fx.keep.withdraw(member(1), &fx.ledger, &mut sink).unwrap();
        assert_eq!(sink.total_sent(), 100);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn test_distribution_conserves_amount(n in 1u64..=16, amount in 0u128..1_000_000_000_000) {
            let mut fx = open(n, 1, KeepConfig::default());
            let result = fx.keep.distribute_eth_reward(amount);
            if amount < n as u128 {
                prop_assert_eq!(result, Err(KeepError::DividendMustBeNonzero));
                return Ok(());
            }
            prop_assert!(result.is_ok());

            let share = amount / n as u128;
            let mut total = 0;
            for i in 0..n {
                let balance = fx.keep.member_eth_balance(member(i)).unwrap();
                if i + 1 < n {
                    prop_assert_eq!(balance, share);
                } else {
                    prop_assert_eq!(balance, amount - share * (n as u128 - 1));
                }
                total += balance;
            }
            prop_assert_eq!(total, amount);
        }
    }
}
