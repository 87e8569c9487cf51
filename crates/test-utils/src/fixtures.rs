//! Keys, parameters and PSBTs shared by the workspace's tests.
//!
//! The PSBTs spend the staking outputs of the software device's first taproot receive key
//! (`m/86'/1'/0'/0/0`). Their leaf scripts use [`COVENANT_PKS`] with a quorum of
//! [`COVENANT_QUORUM`] and the finality provider [`FINALITY_PROVIDER_PK`].

use std::str::FromStr;

use bitcoin::{
    bip32::{DerivationPath, Xpub},
    Amount, Psbt, ScriptBuf, XOnlyPublicKey,
};
use secp256k1::SECP256K1;
use staking_signer_params::prelude::{
    CovenantQuorum, SlashingParams, StakingParams, UnbondingParams, WithdrawParams,
};
use staking_signer_primitives::{
    keys::KeyOrigin,
    policy::{DescriptorTemplate, KeyExpression, WalletPolicy},
};

use crate::device::SoftwareDevice;

/// Seed of [`SoftwareDevice::new`].
pub const TEST_SEED: &str = "b11997faff420a331bb4a4ffdc8bdc8ba7c01732a99a30d83dbbebd469666c84b47d09d3f5f472b3b9384ac634beba2a440ba36ec7661144132f35e206873564";

/// Master fingerprint of [`TEST_SEED`].
pub const TEST_FINGERPRINT: &str = "f5acc2fd";

/// Account xpub of [`TEST_SEED`] at `m/86'/1'/0'`.
pub const TAPROOT_ACCOUNT_XPUB: &str = "tpubDDKYE6BREvDsSWMazgHoyQWiJwYaDDYPbCFjYxN3HFXJP5fokeiK4hwK5tTLBNEDBwrDXn8cQ4v9b2xdW62Xr5yxoQdMu1v6c7UDXYVH27U";

/// X-only key of [`TEST_SEED`] at `m/86'/1'/0'/0/0`.
pub const STAKER_PK: &str = "dc8d2f9eff0c4f4dbde070a48e330efc908b62a766568d91e658f284b324b878";

/// Covenant committee, sorted bytewise.
pub const COVENANT_PKS: [&str; 9] = [
    "0aee0509b16db71c999238a4827db945526859b13c95487ab46725357c9a9f25",
    "113c3a32a9d320b72190a04a020a0db3976ef36972673258e9a38a364f3dc3b0",
    "17921cf156ccb4e73d428f996ed11b245313e37e27c978ac4d2cc21eca4672e4",
    "3bb93dfc8b61887d771f3630e9a63e97cbafcfcc78556a474df83a31a0ef899c",
    "40afaf47c4ffa56de86410d8e47baa2bb6f04b604f4ea24323737ddc3fe092df",
    "79a71ffd71c503ef2e2f91bccfc8fcda7946f4653cef0d9f3dde20795ef3b9f0",
    "d21faf78c6751a0d38e6bd8028b907ff07e9a869a43fc837d6b3f8dff6119a36",
    "f5199efae3f28bb82476163a7e458c7ad445d9bffb0682d10d3bdb2cb41f8e8e",
    "fa9d882d45f4060bdb8042183828cd87544f1ea997380e586cab77d5fd698737",
];

/// Covenant quorum.
pub const COVENANT_QUORUM: u8 = 6;

/// Finality provider of the staking output.
pub const FINALITY_PROVIDER_PK: &str =
    "d66124f8f42fd83e4c901a100ae3b5d706ef6cfd217b04bc64152e739a30c41e";

/// Finality provider shown when unbonding.
pub const UNBONDING_FINALITY_PROVIDER_PK: &str =
    "d23c2c25e1fcf8fd1c21b9a402c19e2e309e531e45e92fb1e9805b6056b0cc76";

/// Output script of the slashing transaction.
pub const SLASHING_PK_SCRIPT: &str = "00145be12624d08a2b424095d7c07221c33450d14bf1";

/// Slashing fee limit.
pub const SLASHING_FEE_SAT: u64 = 2_000;

/// Withdrawal timelock of [`WITHDRAW_PSBT`].
pub const WITHDRAW_TIMELOCK: u64 = 1008;

/// Funds the staking output from the staker's key-path wallet output.
pub const STAKE_PSBT: &str = "cHNidP8BAIkCAAAAAQoDdUgOA5oDhvrH0NWZTa/GJzvd4UhFIbmbOiWufc84AAAAAAD/////AlDDAAAAAAAAIlEg12Pea0ceMFZBukHWXGeC6MvP9uCOg9qrDaEnW7yfqtAcAi0AAAAAACJRIHQO5k5FLjuu4SewPBlbzCGtPt3tLvJsWvSD2cVjBNHlAAAAAAABASvAxi0AAAAAACJRIHQO5k5FLjuu4SewPBlbzCGtPt3tLvJsWvSD2cVjBNHlARcg3I0vnv8MT0294HCkjjMO/JCLYqdmVo2R5ljyhLMkuHgAAAA=";

/// Slashes the staking output through its slashing leaf.
pub const SLASH_PSBT: &str = "cHNidP8BAH0CAAAAAU5oPucfQQOAdrEZwJODBvpzHfaA/orEXxwbxelbMexgAAAAAAD/////AsQJAAAAAAAAFgAUW+EmJNCKK0JAldfAciHDNFDRS/EEpgAAAAAAACJRICyVutUKY9E6qBjfjktoZBga2/RyCoiq+OPBI1ugik2fAAAAAAABAStQwwAAAAAAACJRINdj3mtHHjBWQbpB1lxngujLz/bgjoPaqw2hJ1u8n6rQQhXBUJKbdMGgSVS3i0tgNel6XgeKWg8o7JbVR7/ums6AOsCJtgX5iDHD5SbZ6yF5ZRRSk4qMD/f16u7MthJR1dRt6/15ASDcjS+e/wxPTb3gcKSOMw78kItip2ZWjZHmWPKEsyS4eK0g1mEk+PQv2D5MkBoQCuO11wbvbP0hewS8ZBUuc5owxB6tIAruBQmxbbccmZI4pIJ9uUVSaFmxPJVIerRnJTV8mp8lrCARPDoyqdMgtyGQoEoCCg2zl27zaXJnMljpo4o2Tz3DsLogF5Ic8VbMtOc9Qo+ZbtEbJFMT434nyXisTSzCHspGcuS6IDu5PfyLYYh9dx82MOmmPpfLr8/MeFVqR034OjGg74mcuiBAr69HxP+lbehkENjke6ortvBLYE9OokMjc33cP+CS37ogeacf/XHFA+8uL5G8z8j82nlG9GU87w2fPd4geV7zufC6INIfr3jGdRoNOOa9gCi5B/8H6ahppD/IN9az+N/2EZo2uiD1GZ764/KLuCR2Fjp+RYx61EXZv/sGgtENO9sstB+Ojrog+p2ILUX0BgvbgEIYOCjNh1RPHqmXOA5YbKt31f1phze6VpzAARcgUJKbdMGgSVS3i0tgNel6XgeKWg8o7JbVR7/ums6AOsAAAAA=";

/// Spends the staking output through its unbonding leaf.
pub const UNBOND_PSBT: &str = "cHNidP8BAF4CAAAAARSsiq2TFq5P/835EAvNgCZXDC6CS1+xtit+DY7G1dygAAAAAAD/////AZDiAAAAAAAAIlEg/pvwU6TWJxOSa6vlGbQnPyEX/XzVCkXJjxRCchhfo2EAAAAAAAEBK2DqAAAAAAAAIlEgvuEgqB2XZe+afeBe8ZLwNCRA7hqxujxpU15NDJOT+tFiFcFQkpt0waBJVLeLS2A16XpeB4paDyjsltVHv+6azoA6wGiUOxKox1UcaYkUfLw1P/gRozOyIAYscJZUYYhS14qO7WLOBOR2DLfcS2FXnhYLyDSDei74a1DrKfwNlVI2ikX9VwEg3I0vnv8MT0294HCkjjMO/JCLYqdmVo2R5ljyhLMkuHitIAruBQmxbbccmZI4pIJ9uUVSaFmxPJVIerRnJTV8mp8lrCARPDoyqdMgtyGQoEoCCg2zl27zaXJnMljpo4o2Tz3DsLogF5Ic8VbMtOc9Qo+ZbtEbJFMT434nyXisTSzCHspGcuS6IDu5PfyLYYh9dx82MOmmPpfLr8/MeFVqR034OjGg74mcuiBAr69HxP+lbehkENjke6ortvBLYE9OokMjc33cP+CS37ogeacf/XHFA+8uL5G8z8j82nlG9GU87w2fPd4geV7zufC6INIfr3jGdRoNOOa9gCi5B/8H6ahppD/IN9az+N/2EZo2uiD1GZ764/KLuCR2Fjp+RYx61EXZv/sGgtENO9sstB+Ojrog+p2ILUX0BgvbgEIYOCjNh1RPHqmXOA5YbKt31f1phze6VpzAARcgUJKbdMGgSVS3i0tgNel6XgeKWg8o7JbVR7/ums6AOsAAAA==";

/// Withdraws the unbonded output through its timelock leaf after [`WITHDRAW_TIMELOCK`] blocks.
pub const WITHDRAW_PSBT: &str = "cHNidP8BAF4CAAAAAeH2BxZtWBxqa5e1h7G0LZ7JANIrlRdqkdyObGHed2D3AAAAAADwAwAAAWC6AAAAAAAAIlEgdA7mTkUuO67hJ7A8GVvMIa0+3e0u8mxa9IPZxWME0eUAAAAAAAEBK4C7AAAAAAAAIlEgBSZ/XUbQ9Yp+rjB4isu1kF9Bxmw5L+EimM9U7tEzOMNCFcFQkpt0waBJVLeLS2A16XpeB4paDyjsltVHv+6azoA6wE/2PBlmrPya/P2SJEn+52lqOKw5Js4JbbljP90EMMqbJyDcjS+e/wxPTb3gcKSOMw78kItip2ZWjZHmWPKEsyS4eK0C8AOywAEXIFCSm3TBoElUt4tLYDXpel4HiloPKOyW1Ue/7prOgDrAAAA=";

/// Decodes [`TEST_SEED`].
pub fn test_seed() -> Vec<u8> {
    hex::decode(TEST_SEED).expect("test seed must be valid hex")
}

/// Parses a base64 PSBT fixture.
pub fn psbt(base64: &str) -> Psbt {
    Psbt::from_str(base64).expect("fixture must be a valid psbt")
}

/// Parses a hex x-only key.
pub fn x_only(hex: &str) -> XOnlyPublicKey {
    XOnlyPublicKey::from_str(hex).expect("fixture must be a valid x-only key")
}

/// The covenant committee.
pub fn covenant_keys() -> Vec<XOnlyPublicKey> {
    COVENANT_PKS.into_iter().map(x_only).collect()
}

/// The covenant committee with its quorum.
pub fn covenant_quorum() -> CovenantQuorum {
    CovenantQuorum::new(COVENANT_QUORUM, covenant_keys())
}

/// Parameters of the staking transaction.
pub fn staking_params() -> StakingParams {
    StakingParams {
        timelock_blocks: 64_000,
        finality_providers: vec![x_only(FINALITY_PROVIDER_PK)],
        covenants: covenant_quorum(),
    }
}

/// Parameters matching [`SLASH_PSBT`].
pub fn slashing_params() -> SlashingParams {
    SlashingParams {
        timelock_blocks: 64_000,
        finality_providers: vec![x_only(FINALITY_PROVIDER_PK)],
        covenants: covenant_quorum(),
        slashing_pk_script: ScriptBuf::from_bytes(
            hex::decode(SLASHING_PK_SCRIPT).expect("fixture must be valid hex"),
        ),
        slashing_fee: Amount::from_sat(SLASHING_FEE_SAT),
    }
}

/// Parameters matching [`UNBOND_PSBT`].
pub fn unbonding_params() -> UnbondingParams {
    UnbondingParams {
        timelock_blocks: WITHDRAW_TIMELOCK,
        finality_providers: Some(vec![x_only(UNBONDING_FINALITY_PROVIDER_PK)]),
        covenants: covenant_quorum(),
        unbonding_fee: Amount::from_sat(2_000),
    }
}

/// Parameters matching [`WITHDRAW_PSBT`].
pub const fn withdraw_params() -> WithdrawParams {
    WithdrawParams {
        timelock_blocks: WITHDRAW_TIMELOCK,
    }
}

/// `m/86'/1'/0'`.
pub fn taproot_account_path() -> DerivationPath {
    DerivationPath::from_str("m/86'/1'/0'").expect("must be a valid path")
}

/// `m/84'/1'/0'`.
pub fn segwit_account_path() -> DerivationPath {
    DerivationPath::from_str("m/84'/1'/0'").expect("must be a valid path")
}

/// A `tr(@0/**)` policy over the device's taproot account.
pub fn own_key_policy(device: &SoftwareDevice) -> WalletPolicy {
    let path = taproot_account_path();
    let xpub = Xpub::from_priv(SECP256K1, &device.derive_priv(&path));
    let key = KeyExpression::new(
        Some(KeyOrigin::new(device.fingerprint(), path)),
        xpub.to_string(),
    );

    WalletPolicy::new(
        "Staking transaction",
        &DescriptorTemplate::key_path_only(),
        vec![key],
    )
    .expect("single key policy must be valid")
}
