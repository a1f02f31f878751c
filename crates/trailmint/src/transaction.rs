//! Transaction assembly.
//!
//! A mint is built as *kind bytes* only: one programmable transaction with
//! a single move call and no sender or gas. The client and the sponsor each
//! complete the same kind into [`TransactionData`] independently (sender on
//! one side, gas owner and payment on the other) without re-encoding the
//! call.
//!
//! ```text
//! MintFields ──> TransactionKind ──to_bytes──> kind bytes ──(sponsor)──>
//!     TransactionData { kind, sender, gas_data } ──to_bytes──> tx bytes
//!                                                 │
//!                          TransactionDigest::of ─┤
//!                          signing_message ───────┘
//! ```

use core::{fmt, str::FromStr};

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize, de::Error as _};

use crate::{
    address::Address,
    constants::{Blake2bDomain, INTENT_TRANSACTION},
    primitives::{Epoch, ObjectId, ObjectRef},
};

/// Transaction assembly and decoding failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A numeric field does not fit its on-chain width.
    #[error("{field} = {value} is out of range (0..={max})")]
    ArgumentOutOfRange {
        /// Field name.
        field: &'static str,
        /// Value supplied.
        value: u32,
        /// Largest accepted value.
        max: u32,
    },

    /// Borsh encoding failed.
    #[error("transaction encoding failed: {0}")]
    Encoding(String),

    /// Bytes are not a valid transaction or transaction kind.
    #[error("transaction bytes are malformed: {0}")]
    Decoding(String),

    /// A `package::module::function` target could not be parsed.
    #[error("invalid move call target `{0}`")]
    Target(String),
}

/// A transaction input. Only pure (by-value) inputs are needed here.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum CallArg {
    /// Borsh-encoded value.
    Pure(Vec<u8>),
}

/// A command argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum Argument {
    /// The input at this index.
    Input(u16),
}

/// A call into an on-chain package.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct MoveCall {
    /// Package id.
    pub package: ObjectId,
    /// Module name.
    pub module: String,
    /// Entry function name.
    pub function: String,
    /// Positional arguments.
    pub arguments: Vec<Argument>,
}

/// A programmable transaction command.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum Command {
    /// A move call.
    MoveCall(MoveCall),
}

/// Inputs plus the commands consuming them.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct ProgrammableTransaction {
    /// Transaction inputs.
    pub inputs: Vec<CallArg>,
    /// Commands, executed in order.
    pub commands: Vec<Command>,
}

/// The transaction body without sender or gas.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum TransactionKind {
    /// A programmable transaction.
    ProgrammableTransaction(ProgrammableTransaction),
}

impl TransactionKind {
    /// Kind bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        borsh::to_vec(self).map_err(|err| BuildError::Encoding(err.to_string()))
    }

    /// Decode kind bytes; trailing bytes are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        borsh::from_slice(bytes).map_err(|err| BuildError::Decoding(err.to_string()))
    }

    /// Every package this kind calls into.
    #[expect(clippy::ref_patterns, reason = "payloads are borrowed from a dereferenced self")]
    pub fn called_packages(&self) -> impl Iterator<Item = &ObjectId> {
        let Self::ProgrammableTransaction(ref ptb) = *self;
        ptb.commands.iter().map(|command| match *command {
            Command::MoveCall(ref call) => &call.package,
        })
    }
}

/// Gas payment attached by the sponsor.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct GasData {
    /// Gas coins, each a complete object reference.
    pub payment: Vec<ObjectRef>,
    /// Account paying for gas.
    pub owner: Address,
    /// Reference gas price.
    pub price: u64,
    /// Gas budget.
    pub budget: u64,
}

/// When a transaction stops being valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub enum TransactionExpiration {
    /// Never.
    None,
    /// After this epoch.
    Epoch(Epoch),
}

/// A complete transaction: kind, sender and gas.
#[derive(Clone, Debug, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct TransactionData {
    /// The body.
    pub kind: TransactionKind,
    /// The account authorizing the body.
    pub sender: Address,
    /// Gas payment.
    pub gas_data: GasData,
    /// Expiration.
    pub expiration: TransactionExpiration,
}

impl TransactionData {
    /// Complete a kind with the sender and a sponsor's gas.
    #[must_use]
    pub const fn new_sponsored(kind: TransactionKind, sender: Address, gas_data: GasData) -> Self {
        Self {
            kind,
            sender,
            gas_data,
            expiration: TransactionExpiration::None,
        }
    }

    /// Transaction bytes: what every signer signs (via [`signing_message`]).
    pub fn to_bytes(&self) -> Result<Vec<u8>, BuildError> {
        borsh::to_vec(self).map_err(|err| BuildError::Encoding(err.to_string()))
    }

    /// Decode transaction bytes; trailing bytes are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BuildError> {
        borsh::from_slice(bytes).map_err(|err| BuildError::Decoding(err.to_string()))
    }
}

/// A transaction digest, written as base58.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TransactionDigest([u8; 32]);

impl TransactionDigest {
    /// Digest of transaction bytes.
    #[must_use]
    pub fn of(tx_bytes: &[u8]) -> Self {
        Self(Blake2bDomain::TX_DIGEST.narrow(&[tx_bytes]))
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for TransactionDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TransactionDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl FromStr for TransactionDigest {
    type Err = BuildError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || BuildError::Decoding(format!("invalid transaction digest `{text}`"));
        let decoded = bs58::decode(text).into_vec().map_err(|_err| invalid())?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|_err: Vec<u8>| invalid())?;
        Ok(Self(bytes))
    }
}

impl Serialize for TransactionDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TransactionDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// The message signers sign for transaction bytes.
#[must_use]
pub fn signing_message(tx_bytes: &[u8]) -> [u8; 32] {
    Blake2bDomain::INTENT.narrow(&[&INTENT_TRANSACTION, tx_bytes])
}

/// A `package::module::function` entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintTarget {
    /// Package id.
    pub package: ObjectId,
    /// Module name.
    pub module: String,
    /// Function name.
    pub function: String,
}

impl MintTarget {
    /// Module of the hiking-record package.
    pub const DEFAULT_MODULE: &'static str = "shallwemove";
    /// Entry function minting a hiking record.
    pub const DEFAULT_FUNCTION: &'static str = "mint";

    /// The standard mint entry point in `package`.
    #[must_use]
    pub fn in_package(package: ObjectId) -> Self {
        Self {
            package,
            module: Self::DEFAULT_MODULE.to_owned(),
            function: Self::DEFAULT_FUNCTION.to_owned(),
        }
    }
}

impl fmt::Display for MintTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.function)
    }
}

impl FromStr for MintTarget {
    type Err = BuildError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || BuildError::Target(text.to_owned());
        let mut parts = text.split("::");
        let (Some(package), Some(module), Some(function), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };
        if module.is_empty() || function.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            package: package.parse().map_err(|_err| invalid())?,
            module: module.to_owned(),
            function: function.to_owned(),
        })
    }
}

impl Serialize for MintTarget {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MintTarget {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = <String as Deserialize>::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}

/// A hiking record to mint.
///
/// Image URL and numeric fields come from collaborators (object storage,
/// track parsing) already extracted. Numeric fields are accepted wide and
/// range-checked to `u16` at assembly time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintFields {
    /// Where the hike took place.
    pub location: String,
    /// Free-text description.
    pub description: String,
    /// Stable URL of the uploaded image.
    pub image_url: String,
    /// Number of participants.
    pub participants: u32,
    /// Maximum elevation, metres.
    pub max_elevation: u32,
    /// Duration, minutes.
    pub duration: u32,
    /// Date of the hike.
    pub date: String,
    /// Start time.
    pub start_time: String,
    /// End time.
    pub end_time: String,
}

impl MintFields {
    /// Check every numeric field fits in `u16`.
    pub fn validate(&self) -> Result<(), BuildError> {
        for (field, value) in self.numeric_fields() {
            narrow(field, value)?;
        }
        Ok(())
    }

    fn numeric_fields(&self) -> [(&'static str, u32); 3] {
        [
            ("participants", self.participants),
            ("maxElevation", self.max_elevation),
            ("duration", self.duration),
        ]
    }
}

fn narrow(field: &'static str, value: u32) -> Result<u16, BuildError> {
    u16::try_from(value).map_err(|_err| BuildError::ArgumentOutOfRange {
        field,
        value,
        max: u32::from(u16::MAX),
    })
}

fn pure<T: BorshSerialize>(value: &T) -> Result<CallArg, BuildError> {
    borsh::to_vec(value)
        .map(CallArg::Pure)
        .map_err(|err| BuildError::Encoding(err.to_string()))
}

/// Build the mint call as a transaction kind.
///
/// Arguments, in order: location, description, image URL (strings),
/// participants, max elevation, duration (`u16`), date, start time, end
/// time (strings).
pub fn build_mint_kind(
    target: &MintTarget,
    fields: &MintFields,
) -> Result<TransactionKind, BuildError> {
    let participants = narrow("participants", fields.participants)?;
    let max_elevation = narrow("maxElevation", fields.max_elevation)?;
    let duration = narrow("duration", fields.duration)?;

    let inputs = vec![
        pure(&fields.location)?,
        pure(&fields.description)?,
        pure(&fields.image_url)?,
        pure(&participants)?,
        pure(&max_elevation)?,
        pure(&duration)?,
        pure(&fields.date)?,
        pure(&fields.start_time)?,
        pure(&fields.end_time)?,
    ];
    let arguments = (0..u16::try_from(inputs.len()).unwrap_or(u16::MAX))
        .map(Argument::Input)
        .collect();

    Ok(TransactionKind::ProgrammableTransaction(
        ProgrammableTransaction {
            inputs,
            commands: vec![Command::MoveCall(MoveCall {
                package: target.package,
                module: target.module.clone(),
                function: target.function.clone(),
                arguments,
            })],
        },
    ))
}

/// Build the mint call as kind bytes.
pub fn build_mint_transaction(
    target: &MintTarget,
    fields: &MintFields,
) -> Result<Vec<u8>, BuildError> {
    build_mint_kind(target, fields)?.to_bytes()
}
