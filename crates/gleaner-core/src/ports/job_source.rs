//! JobSource port - リスティング取得元
//!
//! ブラウザ操作・認証などは実装側の責務。コアは結果の列だけを受け取る。

use async_trait::async_trait;

use crate::domain::RawJob;
use crate::error::SourceFetchError;

#[async_trait]
pub trait JobSource: Send + Sync {
    /// Fetch the current listings for `query`, at most `limit` of them.
    async fn fetch_listings(&self, query: &str, limit: usize)
    -> Result<Vec<RawJob>, SourceFetchError>;
}
