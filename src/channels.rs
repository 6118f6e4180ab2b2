use std::collections::HashMap;

/// The implicit root channel every server has. Created at construction,
/// never removed.
pub const ROOT_CHANNEL_ID: u32 = 0;

/// A named channel in the server's hierarchy.
///
/// The channel's position in the tree is owned by [`ChannelTree`], not stored
/// here, so the tree stays the single authority on structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u32,
    pub name: String,
    pub description: String,
}

impl Channel {
    pub fn new(id: u32, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A connected user. Session ids are unique while the user is connected but
/// may be recycled by the server across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub session_id: u32,
    pub name: String,
    /// Channel the user currently occupies; `None` until a state update
    /// names one.
    pub channel_id: Option<u32>,
}

impl User {
    pub fn new(session_id: u32, name: impl Into<String>, channel_id: Option<u32>) -> Self {
        Self {
            session_id,
            name: name.into(),
            channel_id,
        }
    }
}

#[derive(Debug)]
struct ChannelNode {
    channel: Channel,
    parent: Option<u32>,
    children: Vec<u32>,
}

/// The channel hierarchy plus the flat user roster.
///
/// Structure is kept as an id-indexed node map whose parent/children links
/// are updated together with the index, so lookups never walk the tree and
/// structural edits cannot leave the two out of sync. Child order follows
/// insertion order.
#[derive(Debug)]
pub struct ChannelTree {
    nodes: HashMap<u32, ChannelNode>,
    users: HashMap<u32, User>,
    roster_order: Vec<u32>,
}

impl ChannelTree {
    /// Create a tree containing only the root channel.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_CHANNEL_ID,
            ChannelNode {
                channel: Channel::new(ROOT_CHANNEL_ID, "Root", ""),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            users: HashMap::new(),
            roster_order: Vec::new(),
        }
    }

    /// Insert `channel` as a new child of `parent_id`.
    ///
    /// Returns false without touching the tree if the parent is unknown or
    /// the id is already taken. The server never sends a child before its
    /// parent; this guards against malformed input.
    pub fn add_channel(&mut self, channel: Channel, parent_id: u32) -> bool {
        if self.nodes.contains_key(&channel.id) || !self.nodes.contains_key(&parent_id) {
            return false;
        }
        let id = channel.id;
        self.nodes.insert(
            id,
            ChannelNode {
                channel,
                parent: Some(parent_id),
                children: Vec::new(),
            },
        );
        if let Some(parent) = self.nodes.get_mut(&parent_id) {
            parent.children.push(id);
        }
        true
    }

    pub fn get_channel(&self, id: u32) -> Option<&Channel> {
        self.nodes.get(&id).map(|node| &node.channel)
    }

    /// Linear scan; returns the first match if names are duplicated.
    pub fn get_channel_by_name(&self, name: &str) -> Option<&Channel> {
        self.nodes
            .values()
            .map(|node| &node.channel)
            .find(|channel| channel.name == name)
    }

    /// Update a known channel's mutable fields in place. Returns false if
    /// the channel is unknown or no field was given.
    pub fn update_channel(
        &mut self,
        id: u32,
        name: Option<&str>,
        description: Option<&str>,
    ) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        let mut updated = false;
        if let Some(name) = name {
            node.channel.name = name.to_string();
            updated = true;
        }
        if let Some(description) = description {
            node.channel.description = description.to_string();
            updated = true;
        }
        updated
    }

    /// Remove the channel and every descendant, atomically.
    ///
    /// Removing the root is refused. Users whose channel pointer referenced
    /// a removed channel keep the stale id; nothing reassigns them.
    pub fn remove_subtree(&mut self, id: u32) {
        if id == ROOT_CHANNEL_ID || !self.nodes.contains_key(&id) {
            return;
        }

        let mut doomed = vec![id];
        let mut cursor = 0;
        while cursor < doomed.len() {
            if let Some(node) = self.nodes.get(&doomed[cursor]) {
                doomed.extend_from_slice(&node.children);
            }
            cursor += 1;
        }

        if let Some(parent_id) = self.nodes.get(&id).and_then(|node| node.parent) {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|&child| child != id);
            }
        }
        for channel_id in doomed {
            self.nodes.remove(&channel_id);
        }
    }

    /// Immediate parent's id, or `None` for the root and for unknown ids.
    pub fn get_parent_id(&self, id: u32) -> Option<u32> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn has_children(&self, id: u32) -> bool {
        self.nodes
            .get(&id)
            .map(|node| !node.children.is_empty())
            .unwrap_or(false)
    }

    /// Every channel, parents strictly before their descendants (pre-order,
    /// root first, children in insertion order).
    pub fn channels_in_topological_order(&self) -> Vec<&Channel> {
        let mut ordered = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![ROOT_CHANNEL_ID];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                ordered.push(&node.channel);
                stack.extend(node.children.iter().rev());
            }
        }
        ordered
    }

    /// Number of channels currently in the tree, root included.
    pub fn channel_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add a user to the roster, replacing any record with the same session
    /// id in place.
    pub fn add_user(&mut self, user: User) {
        if !self.users.contains_key(&user.session_id) {
            self.roster_order.push(user.session_id);
        }
        self.users.insert(user.session_id, user);
    }

    pub fn remove_user(&mut self, session_id: u32) -> Option<User> {
        let user = self.users.remove(&session_id);
        if user.is_some() {
            self.roster_order.retain(|&id| id != session_id);
        }
        user
    }

    pub fn get_user(&self, session_id: u32) -> Option<&User> {
        self.users.get(&session_id)
    }

    /// Rename a known user in place. Returns false if the session is unknown.
    pub fn set_user_name(&mut self, session_id: u32, name: &str) -> bool {
        match self.users.get_mut(&session_id) {
            Some(user) => {
                user.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Move a user's channel pointer. Emits nothing; the caller decides what
    /// roster-visible effects follow from the old/new difference.
    pub fn set_user_channel_id(&mut self, session_id: u32, channel_id: u32) -> bool {
        match self.users.get_mut(&session_id) {
            Some(user) => {
                user.channel_id = Some(channel_id);
                true
            }
            None => false,
        }
    }

    pub fn get_user_channel_id(&self, session_id: u32) -> Option<u32> {
        self.users.get(&session_id).and_then(|user| user.channel_id)
    }

    /// Display names of every user currently in `channel_id`, in roster
    /// (insertion) order.
    pub fn channel_user_names(&self, channel_id: u32) -> Vec<String> {
        self.roster_order
            .iter()
            .filter_map(|session_id| self.users.get(session_id))
            .filter(|user| user.channel_id == Some(channel_id))
            .map(|user| user.name.clone())
            .collect()
    }
}

impl Default for ChannelTree {
    fn default() -> Self {
        Self::new()
    }
}
