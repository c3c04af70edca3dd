use crate::github::models::CommentTarget;

/// Where a triggering comment sits on the pull request. Every field is
/// optional; which ones are present decides how the bot replies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentAnchor {
    pub comment_id: Option<i64>,
    pub commit_id: Option<String>,
    pub path: Option<String>,
    pub position: Option<i64>,
    pub side: Option<String>,
}

type Route = fn(&CommentAnchor) -> Option<CommentTarget>;

/// Reply placements in priority order. The first route whose required
/// fields are all present wins.
pub const REPLY_ROUTES: &[(&str, Route)] = &[
    ("reply", reply_to_comment),
    ("inline", inline_comment),
    ("issue", issue_comment),
];

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn reply_to_comment(anchor: &CommentAnchor) -> Option<CommentTarget> {
    let comment_id = anchor.comment_id.filter(|id| *id > 0)?;
    Some(CommentTarget::ReviewReply { comment_id })
}

fn inline_comment(anchor: &CommentAnchor) -> Option<CommentTarget> {
    let commit_id = non_empty(&anchor.commit_id)?;
    let path = non_empty(&anchor.path)?;
    let position = anchor.position?;
    Some(CommentTarget::Inline {
        commit_id: commit_id.to_string(),
        path: path.to_string(),
        position,
        side: non_empty(&anchor.side).map(String::from),
    })
}

fn issue_comment(_anchor: &CommentAnchor) -> Option<CommentTarget> {
    Some(CommentTarget::Issue)
}

/// Pick the reply placement for `anchor`.
pub fn select_target(anchor: &CommentAnchor) -> CommentTarget {
    REPLY_ROUTES
        .iter()
        .find_map(|(_, route)| route(anchor))
        .unwrap_or(CommentTarget::Issue)
}
