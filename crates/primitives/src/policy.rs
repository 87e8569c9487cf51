//! Wallet policies: a named descriptor template plus the ordered keys it refers to.
//!
//! Only the closed set of shapes the staking protocol needs is modelled: a single-key
//! `wpkh`, and `tr` with an optional script leaf built from `pk_k`, `and_v`, `multi_a` and
//! `older`.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{constants::MAX_POLICY_NAME_LEN, errors::PolicyError, keys::KeyOrigin};

/// Address type of the account a policy signs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressType {
    /// P2TR key path.
    #[default]
    Taproot,

    /// P2WPKH.
    NativeSegwit,
}

/// A `@i` reference to the policy's key list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyPlaceholder {
    /// Index in the key list.
    pub index: u32,

    /// Whether the key is followed by `/**`, i.e. ranged over receive and change children.
    pub ranged: bool,
}

impl KeyPlaceholder {
    /// `@index/**`.
    pub const fn ranged(index: u32) -> Self {
        Self {
            index,
            ranged: true,
        }
    }

    /// `@index`.
    pub const fn fixed(index: u32) -> Self {
        Self {
            index,
            ranged: false,
        }
    }
}

impl fmt::Display for KeyPlaceholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.index)?;
        if self.ranged {
            f.write_str("/**")?;
        }
        Ok(())
    }
}

/// A miniscript fragment inside a taproot leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// `pk_k(KEY)`.
    PkK(KeyPlaceholder),

    /// `and_v(X, Y)`.
    AndV(Box<Fragment>, Box<Fragment>),

    /// `multi_a(k, KEY_1, ..., KEY_n)`.
    MultiA {
        /// Required signatures.
        threshold: u32,
        /// Participating keys.
        keys: Vec<KeyPlaceholder>,
    },

    /// `older(n)`.
    Older(u32),
}

impl Fragment {
    /// `and_v(left, right)`.
    pub fn and_v(left: Fragment, right: Fragment) -> Self {
        Fragment::AndV(Box::new(left), Box::new(right))
    }

    fn visit_keys(&self, out: &mut Vec<KeyPlaceholder>) {
        match self {
            Fragment::PkK(key) => out.push(*key),
            Fragment::AndV(left, right) => {
                left.visit_keys(out);
                right.visit_keys(out);
            }
            Fragment::MultiA { keys, .. } => out.extend(keys.iter().copied()),
            Fragment::Older(_) => {}
        }
    }

    fn check_thresholds(&self) -> Result<(), PolicyError> {
        match self {
            Fragment::AndV(left, right) => {
                left.check_thresholds()?;
                right.check_thresholds()
            }
            Fragment::MultiA { threshold, keys }
                if *threshold == 0 || *threshold as usize > keys.len() =>
            {
                Err(PolicyError::InvalidThreshold {
                    threshold: *threshold,
                    keys: keys.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::PkK(key) => write!(f, "pk_k({key})"),
            Fragment::AndV(left, right) => write!(f, "and_v({left}, {right})"),
            Fragment::MultiA { threshold, keys } => {
                write!(f, "multi_a({threshold}")?;
                for key in keys {
                    write!(f, ", {key}")?;
                }
                f.write_str(")")
            }
            Fragment::Older(blocks) => write!(f, "older({blocks})"),
        }
    }
}

/// The top-level descriptor template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorTemplate {
    /// `wpkh(KEY)`.
    Wpkh(KeyPlaceholder),

    /// `tr(KEY)` or `tr(KEY, LEAF)`.
    Tr {
        /// Internal key.
        internal: KeyPlaceholder,
        /// Single script leaf, if any.
        leaf: Option<Fragment>,
    },
}

impl DescriptorTemplate {
    /// `tr(@0/**)`.
    pub const fn key_path_only() -> Self {
        DescriptorTemplate::Tr {
            internal: KeyPlaceholder::ranged(0),
            leaf: None,
        }
    }

    /// Every placeholder in order of appearance.
    pub fn placeholders(&self) -> Vec<KeyPlaceholder> {
        let mut out = Vec::new();
        match self {
            DescriptorTemplate::Wpkh(key) => out.push(*key),
            DescriptorTemplate::Tr { internal, leaf } => {
                out.push(*internal);
                if let Some(leaf) = leaf {
                    leaf.visit_keys(&mut out);
                }
            }
        }
        out
    }
}

impl fmt::Display for DescriptorTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorTemplate::Wpkh(key) => write!(f, "wpkh({key})"),
            DescriptorTemplate::Tr {
                internal,
                leaf: None,
            } => write!(f, "tr({internal})"),
            DescriptorTemplate::Tr {
                internal,
                leaf: Some(leaf),
            } => write!(f, "tr({internal}, {leaf})"),
        }
    }
}

/// A key list entry: an optional `[origin]` followed by an extended public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpression {
    /// Origin, absent for keys the device must not derive.
    pub origin: Option<KeyOrigin>,

    /// Base58Check extended public key.
    pub xpub: String,
}

impl KeyExpression {
    /// Pairs an origin with an extended key.
    pub fn new(origin: Option<KeyOrigin>, xpub: impl Into<String>) -> Self {
        Self {
            origin,
            xpub: xpub.into(),
        }
    }
}

impl fmt::Display for KeyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "{origin}")?;
        }
        f.write_str(&self.xpub)
    }
}

impl FromStr for KeyExpression {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PolicyError::MalformedKey(s.to_owned());

        let (origin, xpub) = match s.strip_prefix('[') {
            Some(rest) => {
                let (origin, xpub) = rest.split_once(']').ok_or_else(malformed)?;
                let origin = KeyOrigin::from_str(origin).map_err(|_| malformed())?;
                (Some(origin), xpub)
            }
            None => (None, s),
        };

        if xpub.is_empty() || !xpub.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(malformed());
        }

        Ok(Self::new(origin, xpub))
    }
}

/// A wallet policy as registered with, and signed against by, the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletPolicy {
    name: String,
    descriptor_template: String,
    keys: Vec<String>,
}

impl WalletPolicy {
    /// Assembles a policy after checking that `template` and `keys` agree.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::InvalidName`] if the name is empty, longer than
    ///   [`MAX_POLICY_NAME_LEN`] or not printable ASCII.
    /// - [`PolicyError::MissingKey`] if a placeholder points past the key list.
    /// - [`PolicyError::UnusedKey`] if a key is never referenced.
    /// - [`PolicyError::InvalidThreshold`] if a `multi_a` threshold is out of range.
    pub fn new(
        name: impl Into<String>,
        template: &DescriptorTemplate,
        keys: Vec<KeyExpression>,
    ) -> Result<Self, PolicyError> {
        let name = name.into();
        validate_name(&name)?;

        let referenced: BTreeSet<u32> = template
            .placeholders()
            .into_iter()
            .map(|placeholder| placeholder.index)
            .collect();

        if let Some(&index) = referenced.iter().find(|&&i| i as usize >= keys.len()) {
            return Err(PolicyError::MissingKey {
                index,
                keys: keys.len(),
            });
        }

        if let Some(unused) = (0..keys.len()).find(|i| !referenced.contains(&(*i as u32))) {
            return Err(PolicyError::UnusedKey(unused));
        }

        if let DescriptorTemplate::Tr {
            leaf: Some(leaf), ..
        } = template
        {
            leaf.check_thresholds()?;
        }

        Ok(Self {
            name,
            descriptor_template: template.to_string(),
            keys: keys.iter().map(ToString::to_string).collect(),
        })
    }

    /// Name shown on the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Descriptor template with `@i` placeholders.
    pub fn descriptor_template(&self) -> &str {
        &self.descriptor_template
    }

    /// Key list, indexed by the template's placeholders.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Parses the key list back into expressions.
    ///
    /// # Errors
    ///
    /// If a key was not produced by [`KeyExpression`]'s display form.
    pub fn key_expressions(&self) -> Result<Vec<KeyExpression>, PolicyError> {
        self.keys.iter().map(|key| key.parse()).collect()
    }
}

fn validate_name(name: &str) -> Result<(), PolicyError> {
    let reason = if name.is_empty() {
        Some("empty")
    } else if name.len() > MAX_POLICY_NAME_LEN {
        Some("longer than 64 bytes")
    } else if !name.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
        Some("not printable ASCII")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(PolicyError::InvalidName {
            name: name.to_owned(),
            reason,
        }),
        None => Ok(()),
    }
}
