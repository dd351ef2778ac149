mod common;

use common::MockSession;
use request_orchestra::{delete, get, head, options, patch, post, put, request, Method, Task, TaskState};
use std::time::Duration;

#[test]
fn test_verb_constructors_set_method_and_redirect_default() {
  let cases: Vec<(Task<MockSession>, Method, Option<bool>)> = vec![
    (get("http://a/"), Method::Get, Some(true)),
    (options("http://a/"), Method::Options, Some(true)),
    (head("http://a/"), Method::Head, Some(false)),
    (post("http://a/"), Method::Post, None),
    (put("http://a/"), Method::Put, None),
    (patch("http://a/"), Method::Patch, None),
    (delete("http://a/"), Method::Delete, None),
  ];

  for (task, method, allow_redirects) in cases {
    assert_eq!(task.method(), &method);
    assert_eq!(task.request().options().allow_redirects, allow_redirects, "verb {}", method);
    assert_eq!(task.state(), TaskState::Created);
    assert!(task.index().is_none());
  }
}

#[test]
fn test_method_parsing_is_case_insensitive() {
  assert_eq!(Method::from("get"), Method::Get);
  assert_eq!(Method::from("Delete"), Method::Delete);
  assert_eq!(Method::from("purge"), Method::Custom("PURGE".to_string()));
  assert_eq!(Method::from("purge").to_string(), "PURGE");
}

#[test]
fn test_builder_options_reach_the_request() {
  let task: Task<MockSession> = request("post", "http://a/upload")
    .header("Content-Type", "application/json")
    .param("dry_run", "1")
    .body(b"{}".to_vec())
    .timeout(Duration::from_secs(3))
    .allow_redirects(false)
    .stream(true);

  let options = task.request().options();
  assert_eq!(task.method(), &Method::Post);
  assert_eq!(task.url(), "http://a/upload");
  assert_eq!(options.header("content-type"), Some("application/json"));
  assert_eq!(options.query_param("dry_run"), Some("1"));
  assert_eq!(options.body.as_deref(), Some(&b"{}"[..]));
  assert_eq!(options.timeout, Some(Duration::from_secs(3)));
  assert_eq!(options.allow_redirects, Some(false));
  assert!(options.stream);
}

#[test]
fn test_task_ids_are_unique() {
  let first: Task<MockSession> = get("http://a/1");
  let second: Task<MockSession> = get("http://a/1");
  assert_ne!(first.id(), second.id());
}
