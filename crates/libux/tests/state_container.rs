use libux::{EventHub, HandlerError, HubEvent, Reply, State, StateEvent, Value, handler};
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

fn recording(state: &State, names: &[&str]) -> Rc<RefCell<Vec<StateEvent>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    state.on(names, handler(move |event: &StateEvent| sink.borrow_mut().push(event.clone())));
    seen
}

#[tokio::test]
async fn batched_update_fires_one_event_per_path() {
    let mut state = State::default();
    let seen = recording(&state, &[StateEvent::UPDATED]);

    let handled = state.update_many([("a.b", 1), ("c", 2)]).unwrap().await;
    assert_eq!(handled, Ok(2));
    assert_eq!(state.state(), &Value::from(json!({"a": {"b": 1}, "c": 2})));
    assert_eq!(
        *seen.borrow(),
        vec![
            StateEvent::Updated {
                path: "a.b".into(),
                new: Value::from(1),
                old: None,
            },
            StateEvent::Updated {
                path: "c".into(),
                new: Value::from(2),
                old: None,
            },
        ]
    );
}

#[tokio::test]
async fn add_appends_to_lists_and_sets_other_keys() {
    let mut state = State::new(json!({"state": {"list": [1]}}));
    let seen = recording(&state, &[StateEvent::ADDED]);

    state.add("list", 2).unwrap().await.unwrap();
    state.add("title", "todos").unwrap().await.unwrap();
    state.add("deep.er", true).unwrap().await.unwrap();

    assert_eq!(
        state.state(),
        &Value::from(json!({"list": [1, 2], "title": "todos", "deep": {"er": true}}))
    );
    let paths: Vec<_> = seen.borrow().iter().filter_map(|event| event.path().map(str::to_owned)).collect();
    assert_eq!(paths, ["list", "title", "deep.er"]);
}

#[test]
fn exists_checks_own_keys_without_creating_levels() {
    let state = State::new(json!({"state": {"a": {"b": null}, "list": ["x"]}}));

    assert!(state.exists("a.b"));
    assert!(state.exists("list.0"));
    assert!(!state.exists("list.1"));
    assert!(!state.exists("a.b.c"));
    assert!(!state.exists("missing.key"));
    assert!(!state.exists(""));
    assert!(state.exists_any(["nope", "a"]));
    assert!(!state.exists_any(Vec::<String>::new()));
    assert_eq!(state.state(), &Value::from(json!({"a": {"b": null}, "list": ["x"]})));
}

#[tokio::test]
async fn list_index_writes_address_positions() {
    let mut state = State::new(json!({"state": {"todos": [{"text": "a", "done": false}]}}));

    state.update("todos.0.done", true).unwrap().await.unwrap();
    state.update("todos.1.text", "b").unwrap().await.unwrap();
    assert_eq!(
        state.get("todos"),
        Some(&Value::from(json!([{"text": "a", "done": true}, {"text": "b"}])))
    );
    assert!(state.update("todos.5.text", "c").is_err());
    assert!(state.update("todos.x", "c").is_err());
}

#[tokio::test]
async fn failing_handler_rejects_the_dispatch() {
    let mut state = State::default();
    let calls = Rc::new(RefCell::new(0));
    let counter = calls.clone();
    state.on(
        StateEvent::UPDATED,
        handler(move |_: &StateEvent| {
            *counter.borrow_mut() += 1;
            Reply::Done
        }),
    );
    state.on(
        StateEvent::UPDATED,
        handler(|_: &StateEvent| Reply::pending(async { Err(HandlerError::new("rejected")) })),
    );

    let dispatch = state.update("a", 1).unwrap();
    // handlers already ran and the write is visible before awaiting
    assert_eq!(*calls.borrow(), 1);
    assert_eq!(state.get("a"), Some(&Value::from(1)));
    assert_eq!(dispatch.await, Err(HandlerError::new("rejected")));
}

#[derive(Debug, Clone)]
struct Ping(&'static str);

impl HubEvent for Ping {
    fn name(&self) -> &str {
        self.0
    }
}

#[tokio::test]
async fn hub_is_usable_on_its_own() {
    let hub = EventHub::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let listener = handler(move |event: &Ping| sink.borrow_mut().push(event.0));
    hub.on(["a", "b"], listener.clone());

    assert_eq!(hub.dispatch(&Ping("a")).await, Ok(1));
    hub.off("a", Some(&listener));
    assert_eq!(hub.dispatch(&Ping("a")).await, Ok(0));
    assert_eq!(hub.dispatch(&Ping("b")).await, Ok(1));
    assert_eq!(*seen.borrow(), ["a", "b"]);
}
