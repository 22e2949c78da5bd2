#![allow(dead_code)]

use room_relay::{ConnectionId, Outbound, Reply, ServerEvent, SessionController, Status};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A connection whose outbox is captured instead of written to a socket.
pub struct TestClient {
    pub id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl TestClient {
    pub fn connect(controller: &mut SessionController) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        controller.connect(id, tx);
        let mut client = TestClient { id, rx };
        client.outbound();
        client
    }

    pub fn outbound(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }

    pub fn events(&mut self) -> Vec<ServerEvent> {
        self.outbound()
            .into_iter()
            .filter_map(|out| match out {
                Outbound::Event(event) => Some(event),
                Outbound::Ack { .. } => None,
            })
            .collect()
    }
}

pub fn status(reply: Option<Reply>) -> Status {
    match reply {
        Some(Reply::Status(status)) => status,
        other => panic!("expected a status reply, got {other:?}"),
    }
}

pub fn last_user_list(events: &[ServerEvent]) -> Option<Vec<String>> {
    events.iter().rev().find_map(|event| match event {
        ServerEvent::UpdateUsers(users) => Some(users.iter().map(|u| u.user_id.clone()).collect()),
        _ => None,
    })
}

pub fn last_typing(events: &[ServerEvent]) -> Option<Vec<String>> {
    events.iter().rev().find_map(|event| match event {
        ServerEvent::TypingUpdate(users) => Some(users.iter().map(|u| u.user_id.clone()).collect()),
        _ => None,
    })
}

pub fn assert_consistent(controller: &SessionController) {
    if let Err(violation) = controller.check_invariants() {
        panic!("invariant violated: {violation}");
    }
}
