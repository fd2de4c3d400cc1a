use xcb::Window;

use crate::client::Client;

/**
 * One workspace: an ordered stack of managed clients plus the client
 * holding input focus there.
 *
 * Stack order is simultaneously Z-order and cycle order, with index 0 the
 * topmost / most recently raised client. A client belongs to exactly one
 * workspace's stack at any time; excise + insert is the only way to move
 * one between workspaces.
 */
#[derive(Debug, Default)]
pub struct Workspace {
    stack: Vec<Client>,
    focused: Option<Window>,
}

impl Workspace {
    pub fn new() -> Workspace {
        Workspace {
            stack: Vec::new(),
            focused: None,
        }
    }

    /// Prepend a client: a newly inserted client is topmost.
    pub fn insert(&mut self, client: Client) {
        self.stack.insert(0, client);
    }

    /// Remove a client, preserving the order of the rest. Clears the focus
    /// handle when the focused client is the one leaving.
    pub fn excise(&mut self, win: Window) -> Option<Client> {
        let pos = self.position(win)?;
        if self.focused == Some(win) {
            self.focused = None;
        }
        Some(self.stack.remove(pos))
    }

    pub fn position(&self, win: Window) -> Option<usize> {
        self.stack.iter().position(|c| c.id() == win)
    }

    pub fn contains(&self, win: Window) -> bool {
        self.position(win).is_some()
    }

    pub fn client(&self, win: Window) -> Option<&Client> {
        self.stack.iter().find(|c| c.id() == win)
    }

    pub fn client_mut(&mut self, win: Window) -> Option<&mut Client> {
        self.stack.iter_mut().find(|c| c.id() == win)
    }

    /// The topmost client, if any
    pub fn top(&self) -> Option<Window> {
        self.stack.first().map(|c| c.id())
    }

    /// Window id at a stack position (0 = topmost)
    pub fn window_at(&self, pos: usize) -> Option<Window> {
        self.stack.get(pos).map(|c| c.id())
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn windows(&self) -> Vec<Window> {
        self.stack.iter().map(|c| c.id()).collect()
    }

    /// Move a client to the top of the stack. Returns true when a restack
    /// actually happened so the caller can skip redundant protocol traffic
    /// for a client that is already topmost.
    pub fn raise_to_top(&mut self, win: Window) -> bool {
        match self.position(win) {
            Some(0) | None => false,
            Some(pos) => {
                let client = self.stack.remove(pos);
                self.stack.insert(0, client);
                true
            }
        }
    }

    pub fn focused(&self) -> Option<Window> {
        self.focused
    }

    pub fn set_focused(&mut self, win: Option<Window>) {
        self.focused = win;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ws_with(wins: &[Window]) -> Workspace {
        let mut ws = Workspace::new();
        // insert prepends, so feed in reverse to get `wins` as stack order
        for &w in wins.iter().rev() {
            ws.insert(Client::new(w));
        }
        ws
    }

    #[test]
    fn insert_prepends() {
        let mut ws = Workspace::new();
        ws.insert(Client::new(1));
        ws.insert(Client::new(2));
        assert_eq!(ws.windows(), vec![2, 1]);
        assert_eq!(ws.top(), Some(2));
    }

    #[test]
    fn excise_preserves_sibling_order() {
        let mut ws = ws_with(&[1, 2, 3]);
        let removed = ws.excise(2).unwrap();
        assert_eq!(removed.id(), 2);
        assert_eq!(ws.windows(), vec![1, 3]);
        assert!(ws.excise(2).is_none());
    }

    #[test]
    fn excise_clears_focus_of_the_leaving_client() {
        let mut ws = ws_with(&[1, 2]);
        ws.set_focused(Some(2));
        ws.excise(2);
        assert_eq!(ws.focused(), None);

        ws.set_focused(Some(1));
        let mut other = Workspace::new();
        other.insert(ws.excise(1).unwrap());
        // the client lives in exactly one stack afterwards
        assert!(ws.is_empty());
        assert!(other.contains(1));
    }

    #[test]
    fn raise_moves_to_top_and_reports_noops() {
        let mut ws = ws_with(&[1, 2, 3]);
        assert!(ws.raise_to_top(3));
        assert_eq!(ws.windows(), vec![3, 1, 2]);
        // already topmost: no restack
        assert!(!ws.raise_to_top(3));
        // unmanaged: no restack
        assert!(!ws.raise_to_top(99));
        assert_eq!(ws.windows(), vec![3, 1, 2]);
    }
}
