//! Recognition of the staking leaf scripts from their opcode sequence.
//!
//! The three script-path leaves of a staking output have fixed shapes:
//!
//! | Leaf      | Script                                                                 |
//! | --------- | ---------------------------------------------------------------------- |
//! | timelock  | `<staker> CHECKSIGVERIFY <n> CSV`                                      |
//! | unbonding | `<staker> CHECKSIGVERIFY <covenant multisig>`                          |
//! | slashing  | `<staker> CHECKSIGVERIFY <fp> CHECKSIGVERIFY <covenant multisig>`      |
//!
//! where `<covenant multisig>` is `<k1> CHECKSIG <k2> CHECKSIGADD ... <kn> CHECKSIGADD <t>
//! NUMEQUAL`. Matching works on the parsed instruction stream, never on a textual disassembly.

use bitcoin::{
    opcodes::{
        all::{
            OP_CHECKSIG, OP_CHECKSIGADD, OP_CHECKSIGVERIFY, OP_CSV, OP_NUMEQUAL, OP_PUSHNUM_1,
            OP_PUSHNUM_16,
        },
        Opcode,
    },
    script::Instruction,
    Script,
};
use secp256k1::XOnlyPublicKey;

/// One of the staking output's script-path leaves, with the values embedded in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StakingLeaf {
    /// The staker alone after a relative timelock.
    Timelock {
        /// Staker key.
        staker: XOnlyPublicKey,
        /// Relative timelock in blocks.
        blocks: u32,
    },

    /// The staker together with a covenant quorum.
    Unbonding {
        /// Staker key.
        staker: XOnlyPublicKey,
        /// Covenant keys in script order.
        covenants: Vec<XOnlyPublicKey>,
        /// Covenant quorum.
        threshold: u32,
    },

    /// The staker, one finality provider and a covenant quorum.
    Slashing {
        /// Staker key.
        staker: XOnlyPublicKey,
        /// Finality provider key.
        finality_provider: XOnlyPublicKey,
        /// Covenant keys in script order.
        covenants: Vec<XOnlyPublicKey>,
        /// Covenant quorum.
        threshold: u32,
    },
}

/// A single parsed element of a leaf script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Key(XOnlyPublicKey),
    Num(u32),
    Op(Opcode),
}

impl StakingLeaf {
    /// Matches `script` against the known leaf shapes.
    ///
    /// Returns `None` for anything that is not exactly one of them.
    pub fn parse(script: &Script) -> Option<Self> {
        let tokens = tokenize(script)?;

        let (staker, rest) = match tokens.as_slice() {
            [Token::Key(staker), Token::Op(OP_CHECKSIGVERIFY), rest @ ..] => (*staker, rest),
            _ => return None,
        };

        match rest {
            [Token::Num(blocks), Token::Op(OP_CSV)] => Some(StakingLeaf::Timelock {
                staker,
                blocks: *blocks,
            }),
            [Token::Key(fp), Token::Op(OP_CHECKSIGVERIFY), multisig @ ..] => {
                let (covenants, threshold) = parse_multisig(multisig)?;
                Some(StakingLeaf::Slashing {
                    staker,
                    finality_provider: *fp,
                    covenants,
                    threshold,
                })
            }
            multisig => {
                let (covenants, threshold) = parse_multisig(multisig)?;
                Some(StakingLeaf::Unbonding {
                    staker,
                    covenants,
                    threshold,
                })
            }
        }
    }

    /// The staker key present in every leaf.
    pub const fn staker(&self) -> &XOnlyPublicKey {
        match self {
            StakingLeaf::Timelock { staker, .. }
            | StakingLeaf::Unbonding { staker, .. }
            | StakingLeaf::Slashing { staker, .. } => staker,
        }
    }
}

fn parse_multisig(tokens: &[Token]) -> Option<(Vec<XOnlyPublicKey>, u32)> {
    let (first, tail) = match tokens {
        [Token::Key(first), Token::Op(OP_CHECKSIG), tail @ ..] => (*first, tail),
        _ => return None,
    };

    let mut covenants = vec![first];
    let mut rest = tail;
    loop {
        match rest {
            [Token::Key(key), Token::Op(OP_CHECKSIGADD), tail @ ..] => {
                covenants.push(*key);
                rest = tail;
            }
            [Token::Num(threshold), Token::Op(OP_NUMEQUAL)] => {
                return Some((covenants, *threshold));
            }
            _ => return None,
        }
    }
}

/// Splits `script` into tokens, refusing pushes that do not use the shortest opcode.
fn tokenize(script: &Script) -> Option<Vec<Token>> {
    script
        .instructions_minimal()
        .map(|instruction| match instruction.ok()? {
            Instruction::PushBytes(bytes) if bytes.len() == 32 => {
                XOnlyPublicKey::from_slice(bytes.as_bytes()).ok().map(Token::Key)
            }
            Instruction::PushBytes(bytes) => read_script_num(bytes.as_bytes()).map(Token::Num),
            Instruction::Op(op)
                if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&op.to_u8()) =>
            {
                Some(Token::Num(u32::from(op.to_u8() - OP_PUSHNUM_1.to_u8() + 1)))
            }
            Instruction::Op(op) => Some(Token::Op(op)),
        })
        .collect()
}

/// Decodes a positive minimally-encoded script number of at most four bytes.
fn read_script_num(bytes: &[u8]) -> Option<u32> {
    let (last, rest) = bytes.split_last()?;
    if bytes.len() > 4 || last & 0x80 != 0 {
        return None;
    }
    // A zero top byte is only minimal when it keeps the byte below from reading as negative.
    if *last == 0 && !rest.last().is_some_and(|byte| byte & 0x80 != 0) {
        return None;
    }

    Some(
        bytes
            .iter()
            .rev()
            .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)),
    )
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use bitcoin::{opcodes::all::OP_NUMEQUALVERIFY, script::Builder, ScriptBuf};

    use super::*;

    fn key(hex: &str) -> XOnlyPublicKey {
        XOnlyPublicKey::from_str(hex).unwrap()
    }

    fn staker() -> XOnlyPublicKey {
        key("dc8d2f9eff0c4f4dbde070a48e330efc908b62a766568d91e658f284b324b878")
    }

    fn covenants() -> Vec<XOnlyPublicKey> {
        [
            "0aee0509b16db71c999238a4827db945526859b13c95487ab46725357c9a9f25",
            "113c3a32a9d320b72190a04a020a0db3976ef36972673258e9a38a364f3dc3b0",
            "17921cf156ccb4e73d428f996ed11b245313e37e27c978ac4d2cc21eca4672e4",
        ]
        .into_iter()
        .map(key)
        .collect()
    }

    fn multisig(builder: Builder, keys: &[XOnlyPublicKey], threshold: i64) -> Builder {
        let mut builder = builder;
        for (i, k) in keys.iter().enumerate() {
            builder = builder.push_x_only_key(k).push_opcode(if i == 0 {
                OP_CHECKSIG
            } else {
                OP_CHECKSIGADD
            });
        }
        builder.push_int(threshold).push_opcode(OP_NUMEQUAL)
    }

    #[test]
    fn parses_timelock_leaf() {
        let script = ScriptBuf::from_bytes(
            hex::decode(
                "20dc8d2f9eff0c4f4dbde070a48e330efc908b62a766568d91e658f284b324b878ad02f003b2",
            )
            .unwrap(),
        );

        assert_eq!(
            StakingLeaf::parse(&script),
            Some(StakingLeaf::Timelock {
                staker: staker(),
                blocks: 1008
            })
        );
    }

    #[test]
    fn parses_small_timelock() {
        let script = Builder::new()
            .push_x_only_key(&staker())
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_int(10)
            .push_opcode(OP_CSV)
            .into_script();

        assert!(matches!(
            StakingLeaf::parse(&script),
            Some(StakingLeaf::Timelock { blocks: 10, .. })
        ));
    }

    #[test]
    fn script_numbers_must_be_minimal() {
        assert_eq!(read_script_num(&[0xf0, 0x03]), Some(1008));
        assert_eq!(read_script_num(&[0x80, 0x00]), Some(128));
        assert_eq!(read_script_num(&[0xff, 0xff, 0x00]), Some(65535));

        assert_eq!(read_script_num(&[0xf0, 0x03, 0x00]), None);
        assert_eq!(read_script_num(&[0x05, 0x00]), None);
        assert_eq!(read_script_num(&[0x00]), None);
        assert_eq!(read_script_num(&[0x81]), None);
        assert_eq!(read_script_num(&[0x01, 0x00, 0x00, 0x00, 0x00]), None);
    }

    #[test]
    fn rejects_padded_timelock() {
        let padded = ScriptBuf::from_bytes(
            hex::decode(
                "20dc8d2f9eff0c4f4dbde070a48e330efc908b62a766568d91e658f284b324b878ad03f00300b2",
            )
            .unwrap(),
        );
        assert_eq!(StakingLeaf::parse(&padded), None);

        // 10 pushed as one data byte instead of OP_10.
        let data_push = ScriptBuf::from_bytes(
            hex::decode(
                "20dc8d2f9eff0c4f4dbde070a48e330efc908b62a766568d91e658f284b324b878ad010ab2",
            )
            .unwrap(),
        );
        assert_eq!(StakingLeaf::parse(&data_push), None);
    }

    #[test]
    fn parses_unbonding_and_slashing_leaves() {
        let fp = key("d66124f8f42fd83e4c901a100ae3b5d706ef6cfd217b04bc64152e739a30c41e");

        let unbonding = multisig(
            Builder::new()
                .push_x_only_key(&staker())
                .push_opcode(OP_CHECKSIGVERIFY),
            &covenants(),
            2,
        )
        .into_script();
        assert_eq!(
            StakingLeaf::parse(&unbonding),
            Some(StakingLeaf::Unbonding {
                staker: staker(),
                covenants: covenants(),
                threshold: 2
            })
        );

        let slashing = multisig(
            Builder::new()
                .push_x_only_key(&staker())
                .push_opcode(OP_CHECKSIGVERIFY)
                .push_x_only_key(&fp)
                .push_opcode(OP_CHECKSIGVERIFY),
            &covenants(),
            2,
        )
        .into_script();
        assert_eq!(
            StakingLeaf::parse(&slashing),
            Some(StakingLeaf::Slashing {
                staker: staker(),
                finality_provider: fp,
                covenants: covenants(),
                threshold: 2
            })
        );
    }

    #[test]
    fn rejects_other_shapes() {
        let wrong_tail = Builder::new()
            .push_x_only_key(&staker())
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&covenants()[0])
            .push_opcode(OP_CHECKSIG)
            .push_int(1)
            .push_opcode(OP_NUMEQUALVERIFY)
            .into_script();
        assert_eq!(StakingLeaf::parse(&wrong_tail), None);

        let key_only = Builder::new()
            .push_x_only_key(&staker())
            .push_opcode(OP_CHECKSIG)
            .into_script();
        assert_eq!(StakingLeaf::parse(&key_only), None);

        assert_eq!(StakingLeaf::parse(Script::new()), None);
    }
}
