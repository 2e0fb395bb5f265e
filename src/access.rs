use std::collections::BTreeSet;

/// Operator chats allowed to issue commands and receive comment notices.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    chats: BTreeSet<i64>,
}

impl AllowList {
    pub fn new(chats: impl IntoIterator<Item = i64>) -> Self {
        Self {
            chats: chats.into_iter().collect(),
        }
    }

    pub fn contains(&self, chat_id: i64) -> bool {
        self.chats.contains(&chat_id)
    }

    pub fn chats(&self) -> impl Iterator<Item = i64> + '_ {
        self.chats.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}
