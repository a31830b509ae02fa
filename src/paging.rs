use std::future::Future;

use crate::context::Context;
use crate::error::StorageError;
use crate::types::Page;

/// 顺序拉取所有分页，直到后端不再返回 cursor
///
/// 每一页依赖上一页的 cursor，不能并发请求。
pub(crate) async fn drain<T, F, Fut>(
    ctx: &Context,
    operation: &'static str,
    scope: &str,
    mut fetch: F,
) -> Result<Vec<T>, StorageError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, StorageError>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = ctx.run(operation, fetch(cursor.clone())).await?;
        pages += 1;
        items.extend(page.items);

        match page.next_cursor {
            Some(next) if next.is_empty() => break,
            Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                return Err(StorageError::backend(
                    format!("pagination cursor did not advance: {}", next),
                    operation,
                    scope,
                    None,
                ));
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    tracing::trace!(operation, scope, pages, items = items.len(), "pagination drained");
    Ok(items)
}
