//! Property tests over arbitrary operation sequences

use proptest::prelude::*;
use silo_common::types::PositionKey;

use crate::*;

const BASE: AssetId = [1u8; 32];
const LP: AssetId = [3u8; 32];
const ACCOUNTS: [Address; 2] = [[10u8; 32], [11u8; 32]];

fn silo() -> Silo {
    let mut silo = Silo::genesis(SiloConfig {
        genesis_epoch: 10,
        migration_epoch: 10,
        base_asset: BASE,
        flood_asset: [2u8; 32],
    })
    .unwrap();
    silo.whitelist_asset(BASE, AssetConfig::new(100, 2), UnitValuation)
        .unwrap();
    silo.whitelist_asset(LP, AssetConfig::new(300, 3), RatioValuation::new(3, 7).unwrap())
        .unwrap();
    silo
}

fn accept(_: &AssetId, _: &Address, _: u128) -> bool {
    true
}

#[derive(Debug, Clone)]
enum Op {
    Deposit { who: usize, lp: bool, quantity: u128 },
    Withdraw { who: usize, lp: bool, pick: usize, percent: u128 },
    Transfer { who: usize, lp: bool, pick: usize, percent: u128 },
    Convert { who: usize, pick: usize, percent: u128, to_quantity: u128 },
    Advance { epochs: u64 },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..2usize, any::<bool>(), 1u128..1_000_000)
            .prop_map(|(who, lp, quantity)| Op::Deposit { who, lp, quantity }),
        (0..2usize, any::<bool>(), any::<usize>(), 1u128..=100)
            .prop_map(|(who, lp, pick, percent)| Op::Withdraw { who, lp, pick, percent }),
        (0..2usize, any::<bool>(), any::<usize>(), 1u128..=100)
            .prop_map(|(who, lp, pick, percent)| Op::Transfer { who, lp, pick, percent }),
        (0..2usize, any::<usize>(), 1u128..=100, 0u128..1_000).prop_map(
            |(who, pick, percent, to_quantity)| Op::Convert {
                who,
                pick,
                percent,
                to_quantity,
            }
        ),
        (1u64..5).prop_map(|epochs| Op::Advance { epochs }),
    ]
}

/// A position of `account` and a slice of it, if it holds any
fn slice_of(
    silo: &Silo,
    account: &Address,
    asset: &AssetId,
    pick: usize,
    percent: u128,
) -> Option<(AccrualIndex, u128)> {
    let positions = silo.positions_of(account, asset);
    if positions.is_empty() {
        return None;
    }
    let (index, position) = positions[pick % positions.len()];
    Some((index, (position.quantity * percent / 100).max(1)))
}

fn apply(silo: &Silo, op: &Op) -> Option<SiloResult<()>> {
    let asset = |lp: bool| if lp { LP } else { BASE };
    let result = match *op {
        Op::Deposit { who, lp, quantity } => {
            silo.deposit(&ACCOUNTS[who], &asset(lp), quantity).map(|_| ())
        }
        Op::Withdraw { who, lp, pick, percent } => {
            let (index, amount) = slice_of(silo, &ACCOUNTS[who], &asset(lp), pick, percent)?;
            silo.withdraw(&ACCOUNTS[who], &asset(lp), index, amount, &mut accept)
                .map(|_| ())
        }
        Op::Transfer { who, lp, pick, percent } => {
            let (index, amount) = slice_of(silo, &ACCOUNTS[who], &asset(lp), pick, percent)?;
            silo.transfer_position(&ACCOUNTS[who], &ACCOUNTS[1 - who], &asset(lp), index, amount)
                .map(|_| ())
        }
        Op::Convert { who, pick, percent, to_quantity } => {
            let (index, amount) = slice_of(silo, &ACCOUNTS[who], &BASE, pick, percent)?;
            silo.convert(&ConvertRequest {
                account: ACCOUNTS[who],
                from_asset: BASE,
                to_asset: LP,
                indices: vec![index],
                amounts: vec![amount],
                to_quantity,
            })
            .map(|_| ())
        }
        Op::Advance { epochs } => silo
            .advance_epoch(&EpochReport::tick(silo.epoch() + epochs))
            .map(|_| ()),
    };
    Some(result)
}

fn stalk_consistent(silo: &Silo) -> bool {
    let totals = silo.totals();
    let stalk: u128 = ACCOUNTS.iter().map(|a| silo.balance_of_stalk(a)).sum();
    let roots: u128 = ACCOUNTS.iter().map(|a| silo.balance_of_roots(a)).sum();
    stalk == totals.stalk && roots == totals.roots
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Stored position values always add up to the asset totals, and failed
    /// operations leave no trace
    #[test]
    fn conservation_over_operation_sequences(ops in prop::collection::vec(arb_op(), 1..40)) {
        let silo = silo();
        for op in &ops {
            let before = silo.snapshot();
            if let Some(Err(_)) = apply(&silo, op) {
                prop_assert_eq!(silo.snapshot(), before);
            }
            let state = silo.snapshot();
            for asset in [BASE, LP] {
                prop_assert_eq!(state.stored_value(&asset), silo.total_value(&asset).unwrap());
                prop_assert_eq!(state.stored_quantity(&asset), silo.total_deposited(&asset).unwrap());
            }
            prop_assert!(stalk_consistent(&silo));
        }
    }

    /// A second mow in the same epoch changes nothing
    #[test]
    fn mow_is_idempotent(quantity in 3u128..1_000_000, epochs in 1u64..50, lp in any::<bool>()) {
        let silo = silo();
        let asset = if lp { LP } else { BASE };
        silo.deposit(&ACCOUNTS[0], &asset, quantity).unwrap();
        silo.advance_epoch(&EpochReport::tick(10 + epochs)).unwrap();

        silo.mow(&ACCOUNTS[0], &asset).unwrap();
        let first = silo.account(&ACCOUNTS[0]);
        prop_assert_eq!(silo.mow(&ACCOUNTS[0], &asset).unwrap(), 0);
        prop_assert_eq!(silo.account(&ACCOUNTS[0]), first);
    }

    /// Two partial removals return exactly what one full removal would
    #[test]
    fn partial_removal_is_linear(quantity in 2u128..1_000_000, split in 1u128..1_000_000) {
        let split = 1 + split % (quantity - 1);
        let silo = silo();
        let deposited = silo.deposit(&ACCOUNTS[0], &LP, quantity);
        prop_assume!(deposited.is_ok());
        let value = deposited.unwrap().value;

        let first = silo.withdraw(&ACCOUNTS[0], &LP, 0, split, &mut accept);
        prop_assume!(first.is_ok());
        let rest = silo.withdraw(&ACCOUNTS[0], &LP, 0, quantity - split, &mut accept).unwrap();
        prop_assert_eq!(first.unwrap().value + rest.value, value);
    }

    /// Conversion never recognizes less value than it removed
    #[test]
    fn conversion_never_dilutes(
        quantity in 1u128..1_000_000,
        to_quantity in 1u128..1_000_000,
        price in 0u128..u64::MAX as u128,
        epochs in 0u64..20,
    ) {
        let mut silo = silo();
        silo.register_valuation(LP, move |_: u128| -> SiloResult<u128> { Ok(price) }).unwrap();
        let removed = silo.deposit(&ACCOUNTS[0], &BASE, quantity).unwrap().value;
        silo.advance_epoch(&EpochReport::tick(10 + epochs)).unwrap();

        let receipt = silo.convert(&ConvertRequest {
            account: ACCOUNTS[0],
            from_asset: BASE,
            to_asset: LP,
            indices: vec![0],
            amounts: vec![quantity],
            to_quantity,
        }).unwrap();
        prop_assert!(receipt.value >= removed);
        prop_assert!(receipt.carried_reward <= 2 * u128::from(epochs) * removed);
    }

    /// Synthetic legacy indices never collide with deposit indices
    #[test]
    fn legacy_range_is_disjoint(
        rate in 1i128..10_000,
        migration in 1u64..2_000_000,
        offset in 1u64..2_000_000,
        tip in 0i128..i64::MAX as i128,
    ) {
        let config = SiloConfig {
            genesis_epoch: migration,
            migration_epoch: migration,
            base_asset: BASE,
            flood_asset: [2u8; 32],
        };
        let settings = silo_common::types::AssetSettings::new(
            AssetConfig::new(1, 1).with_legacy(rate, false),
            migration,
        );

        let epoch = migration.saturating_sub(offset);
        if legacy::is_legacy_epoch(&config, epoch) {
            let legacy = settings.legacy.unwrap();
            let index = legacy::synthetic_index(&config, &legacy, epoch).unwrap();
            prop_assert!(index < 0);
            prop_assert_eq!(
                legacy::resolve(&config, &settings, index),
                PositionKey::Legacy { index, epoch }
            );
        }
        prop_assert_eq!(legacy::resolve(&config, &settings, tip), PositionKey::Current(tip));
    }
}
