//! Infrastructure services

mod gateway;

pub use gateway::{
    extract_api_key, response_cache_key, GatewayOutcome, GatewayService, QuotaInfo,
    API_KEY_HEADER, OWNER_ID_HEADER, USER_TIER_HEADER,
};
