//! Thread-context assembly.
//!
//! Pure functions: everything here works off posts the change detector
//! already fetched in the same cycle. No network calls.

use fudwatch_common::{FeedPost, ThreadContext, ThreadMessage};

/// Context for a brand-new top-level post: no ancestors.
pub fn for_post(post: &FeedPost) -> ThreadContext {
    ThreadContext {
        message: ThreadMessage::from(post),
        parent: None,
        grandparent: None,
    }
}

/// Context for a new reply inside `thread_root`'s reply tree.
///
/// `fetched` is the reply list pulled for that tree this cycle. The parent
/// is resolved from the reply's `in_reply_to`; the grandparent exists only
/// when the parent is itself a reply. An ancestor that was not fetched
/// (pagination race) is simply absent.
pub fn for_reply(reply: &FeedPost, thread_root: &FeedPost, fetched: &[FeedPost]) -> ThreadContext {
    let parent_id = reply.in_reply_to.as_deref();

    let parent_post = parent_id.and_then(|pid| resolve(pid, thread_root, fetched));
    let grandparent_post = parent_post
        .and_then(|p| p.in_reply_to.as_deref())
        .and_then(|gid| resolve(gid, thread_root, fetched));

    ThreadContext {
        message: ThreadMessage::from(reply),
        parent: parent_post.map(ThreadMessage::from),
        grandparent: grandparent_post.map(ThreadMessage::from),
    }
}

fn resolve<'a>(id: &str, thread_root: &'a FeedPost, fetched: &'a [FeedPost]) -> Option<&'a FeedPost> {
    if thread_root.id == id {
        return Some(thread_root);
    }
    fetched.iter().find(|p| p.id == id)
}
