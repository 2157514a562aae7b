//! Services layer: codecs, issuance, grant dispatch and bearer verification.

pub mod bearer;
pub mod clock;
pub mod codec;
pub mod error;
pub mod granter;
pub mod issuer;
pub mod registry;

pub use bearer::{BearerPolicy, Principal};
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{Claims, CodecOverrides, DefaultExpiry, KeyMaterial, SignOptions, TokenCodec};
pub use error::{AuthError, ErrorResponse};
pub use granter::{
    GrantCheck, GrantRequest, Granter, GranterRegistry, OriginCheck, TokenResponse,
    GRANT_TYPE_CLIENT_CREDENTIALS, GRANT_TYPE_PASSWORD, GRANT_TYPE_REFRESH_TOKEN,
};
pub use issuer::{IssueOptions, IssuedToken, Issuer};
pub use registry::CodecRegistry;
