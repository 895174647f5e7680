//! 请求处理共享状态

use hospital_core::{BookingStore, CredentialStore, LedgerStore, RecordStore};
use std::sync::Arc;

use crate::auth::TokenIssuer;

#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub records: Arc<dyn RecordStore>,
    pub tokens: Arc<TokenIssuer>,
}

impl AppState {
    /// 由同时实现全部存储接口的后端构造
    pub fn from_store<S>(store: Arc<S>, tokens: TokenIssuer) -> Self
    where
        S: CredentialStore + BookingStore + LedgerStore + RecordStore + 'static,
    {
        Self {
            credentials: store.clone(),
            bookings: store.clone(),
            ledger: store.clone(),
            records: store,
            tokens: Arc::new(tokens),
        }
    }
}
