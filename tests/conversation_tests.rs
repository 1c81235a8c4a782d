// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Conversation turn tests.
//!
//! These drive `/api/ai/chat` against an in-memory database and a scripted
//! model, and check what is stored and what the model was sent.

use axum::http::StatusCode;
use kolang_api::services::conversation::{HISTORY_MARKER, LIVE_MARKER, REPLY_PLACEHOLDER};
use kolang_api::services::openai::Role;
use kolang_api::services::review::{
    GRAMMAR_PLACEHOLDER, STUDY_TIPS_PLACEHOLDER, SUMMARY_PLACEHOLDER,
};
use serde_json::json;
use tower::ServiceExt;

mod common;

async fn learner() -> (
    axum::Router,
    std::sync::Arc<kolang_api::AppState>,
    std::sync::Arc<common::ScriptedModel>,
    String,
) {
    let (app, state, model) = common::create_test_app().await;
    common::seed_user(&state.db, "learner-1", true).await;
    let token = common::create_test_jwt("learner-1", &state.config.jwt_signing_key);
    (app, state, model, token)
}

#[tokio::test]
async fn test_first_turn_creates_chat() {
    let (app, state, model, token) = learner().await;
    model.push_turn("어서 오세요! 무엇을 찾으세요?", false);

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "go-shopping", "message": "안녕하세요"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["user_id"], "learner-1");
    assert_eq!(body["response"], "어서 오세요! 무엇을 찾으세요?");
    assert_eq!(body["situation"], "go-shopping");
    assert_eq!(body["message_count"], 1);
    assert_eq!(body["conversation_ended"], false);

    let chat_id = body["chat_id"].as_str().unwrap();
    let chat = state
        .db
        .get_chat(chat_id, "learner-1")
        .await
        .unwrap()
        .unwrap();
    assert!(chat.active);
    assert_eq!(chat.summary, "New conversation");
    assert_eq!(chat.situation, "go-shopping");
    assert!(chat.feedback.is_none());
    assert!(chat.completed_at.is_none());

    let messages = state.db.list_messages(chat_id).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(!messages[0].is_answer);
    assert_eq!(messages[0].body, "안녕하세요");
    assert!(messages[1].is_answer);
    assert_eq!(messages[1].body, "어서 오세요! 무엇을 찾으세요?");
}

#[tokio::test]
async fn test_prompt_carries_history_and_live_markers() {
    let (app, _state, model, token) = learner().await;
    model.push_turn("어서 오세요!", false);
    model.push_turn("사과는 한 개에 천 원이에요.", false);

    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "go-shopping", "message": "안녕하세요"}),
        ))
        .await
        .unwrap();
    let chat_id = common::json_body(response).await["chat_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "go-shopping", "message": "사과 얼마예요?", "chat_id": chat_id}),
        ))
        .await
        .unwrap();
    let body = common::json_body(response).await;
    assert_eq!(body["message_count"], 2);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);

    let second = &requests[1];
    assert_eq!(second.temperature, 0.0);
    assert!(second.json_output);
    assert_eq!(second.messages.len(), 4);

    assert_eq!(second.messages[0].role, Role::System);
    assert!(second.messages[0].content.contains("Beginner"));
    assert!(!second.messages[0].content.contains("$level"));

    assert_eq!(second.messages[1].role, Role::User);
    assert_eq!(
        second.messages[1].content,
        format!("{HISTORY_MARKER}안녕하세요")
    );
    assert_eq!(second.messages[2].role, Role::Assistant);
    assert_eq!(
        second.messages[2].content,
        format!("{HISTORY_MARKER}어서 오세요!")
    );
    assert_eq!(second.messages[3].role, Role::User);
    assert_eq!(
        second.messages[3].content,
        format!("{LIVE_MARKER}사과 얼마예요?")
    );
}

#[tokio::test]
async fn test_random_course_keeps_situation() {
    let (app, state, model, token) = learner().await;
    for _ in 0..3 {
        model.push_turn("좋아요.", false);
    }

    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "random-course", "message": "시작할게요"}),
        ))
        .await
        .unwrap();
    let body = common::json_body(response).await;
    let chat_id = body["chat_id"].as_str().unwrap().to_string();
    let situation = body["situation"].as_str().unwrap().to_string();
    assert_ne!(situation, "random-course");

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(common::post_json(
                "/api/ai/chat",
                &token,
                json!({"situation": "random-course", "message": "계속해요", "chat_id": chat_id}),
            ))
            .await
            .unwrap();
        let body = common::json_body(response).await;
        assert_eq!(body["situation"], situation.as_str());
        assert_eq!(body["chat_id"], chat_id.as_str());
    }

    let chat = state
        .db
        .get_chat(&chat_id, "learner-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chat.situation, situation);

    let requests = model.requests();
    assert_eq!(
        requests[0].messages[0].content,
        requests[2].messages[0].content
    );
}

#[tokio::test]
async fn test_model_end_signal_closes_chat() {
    let (app, state, model, token) = learner().await;
    model.push_turn("여권 보여 주세요.", false);
    model.push_turn("좋은 여행 되세요!", true);
    model.push_review(
        "공항 체크인 연습",
        "'주세요'를 잘 썼어요",
        "숫자 읽기를 연습하세요",
    );

    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "airport", "message": "체크인하고 싶어요"}),
        ))
        .await
        .unwrap();
    let chat_id = common::json_body(response).await["chat_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "airport", "message": "여기 있어요", "chat_id": chat_id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["conversation_ended"], true);
    assert_eq!(body["response"], "좋은 여행 되세요!");
    assert_eq!(body["message_count"], 2);

    let chat = state
        .db
        .get_chat(&chat_id, "learner-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!chat.active);
    assert!(chat.completed_at.is_some());
    assert_eq!(chat.summary, "공항 체크인 연습");
    let feedback = chat.feedback.unwrap().0;
    assert_eq!(feedback.grammar_points, "'주세요'를 잘 썼어요");
    assert_eq!(feedback.study_tips, "숫자 읽기를 연습하세요");

    assert_eq!(state.db.list_messages(&chat_id).await.unwrap().len(), 4);

    // turn, turn, summary, feedback
    let requests = model.requests();
    assert_eq!(requests.len(), 4);

    let summary = &requests[2];
    assert_eq!(summary.temperature, 0.3);
    assert_eq!(summary.max_tokens, Some(50));
    assert!(summary.json_output);
    assert_eq!(
        summary.messages[1].content,
        "User: 체크인하고 싶어요\nAI: 여권 보여 주세요.\nUser: 여기 있어요\nAI: 좋은 여행 되세요!"
    );

    let feedback_request = &requests[3];
    assert_eq!(feedback_request.temperature, 0.3);
    assert!(feedback_request.messages[0].content.contains("travel"));
    assert_eq!(
        feedback_request.messages[1].content,
        summary.messages[1].content
    );
}

#[tokio::test]
async fn test_closed_chat_refuses_turns() {
    let (app, _state, model, token) = learner().await;
    model.push_turn("안녕히 가세요!", true);
    model.push_review("짧은 인사", "좋아요", "계속 연습하세요");

    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "travel", "message": "안녕히 계세요"}),
        ))
        .await
        .unwrap();
    let body = common::json_body(response).await;
    assert_eq!(body["conversation_ended"], true);
    let chat_id = body["chat_id"].as_str().unwrap().to_string();
    let calls_before = model.completion_calls();

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "travel", "message": "또 만나요", "chat_id": chat_id}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        common::json_body(response).await["error"],
        "conversation_not_found"
    );
    assert_eq!(model.completion_calls(), calls_before);
}

#[tokio::test]
async fn test_unknown_and_foreign_chat_ids() {
    let (app, state, model, token) = learner().await;
    common::seed_user(&state.db, "learner-2", true).await;
    let other_token = common::create_test_jwt("learner-2", &state.config.jwt_signing_key);
    model.push_turn("안녕!", false);

    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/ai/chat",
            &other_token,
            json!({"situation": "talk-with-friends", "message": "안녕"}),
        ))
        .await
        .unwrap();
    let foreign_chat = common::json_body(response).await["chat_id"]
        .as_str()
        .unwrap()
        .to_string();

    for chat_id in [
        foreign_chat.as_str(),
        "00000000-0000-4000-8000-000000000000",
    ] {
        let response = app
            .clone()
            .oneshot(common::post_json(
                "/api/ai/chat",
                &token,
                json!({"situation": "talk-with-friends", "message": "뭐 해?", "chat_id": chat_id}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{chat_id}");
    }

    assert_eq!(model.completion_calls(), 1);
    assert_eq!(
        state.db.list_messages(&foreign_chat).await.unwrap().len(),
        2
    );
}

#[tokio::test]
async fn test_incomplete_profile_is_rejected_before_model_call() {
    let (app, state, model) = common::create_test_app().await;
    common::seed_user(&state.db, "newcomer", false).await;
    let token = common::create_test_jwt("newcomer", &state.config.jwt_signing_key);

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "travel", "message": "안녕하세요"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(
        common::json_body(response).await["error"],
        "profile_incomplete"
    );
    assert_eq!(model.completion_calls(), 0);
    assert!(state
        .db
        .list_recent_chats("newcomer", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_request_validation() {
    let (app, state, model, token) = learner().await;

    let cases = [
        json!({"situation": "space-station", "message": "안녕하세요"}),
        json!({"situation": "travel", "message": "   "}),
        json!({"situation": "travel", "message": "가".repeat(2001)}),
    ];

    for case in cases {
        let response = app
            .clone()
            .oneshot(common::post_json("/api/ai/chat", &token, case.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{case}");
    }

    assert_eq!(model.completion_calls(), 0);
    assert!(state
        .db
        .list_recent_chats("learner-1", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unparseable_reply_uses_placeholder() {
    let (app, state, model, token) = learner().await;
    model.push_reply("I am not JSON");

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "learn-alphabet", "message": "ㄱ은 뭐예요?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = common::json_body(response).await;
    assert_eq!(body["response"], REPLY_PLACEHOLDER);
    assert_eq!(body["conversation_ended"], false);

    let chat_id = body["chat_id"].as_str().unwrap();
    let messages = state.db.list_messages(chat_id).await.unwrap();
    assert_eq!(messages[1].body, REPLY_PLACEHOLDER);
}

#[tokio::test]
async fn test_legacy_error_key_ends_conversation() {
    let (app, _state, model, token) = learner().await;
    model.push_reply(r#"{"response": "수고하셨어요!", "error": true}"#);
    model.push_review("알파벳 복습", "좋아요", "매일 쓰기 연습");

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "learn-alphabet", "message": "끝났어요"}),
        ))
        .await
        .unwrap();

    assert_eq!(
        common::json_body(response).await["conversation_ended"],
        true
    );
}

#[tokio::test]
async fn test_reply_with_both_end_keys_can_close() {
    let (app, state, model, token) = learner().await;
    model.push_reply(r#"{"response": "다음에 또 봐요!", "end": true, "error": false}"#);
    model.push_review("알파벳 복습", "좋아요", "매일 쓰기 연습");

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "learn-alphabet", "message": "이제 갈게요"}),
        ))
        .await
        .unwrap();

    let body = common::json_body(response).await;
    assert_eq!(body["response"], "다음에 또 봐요!");
    assert_eq!(body["conversation_ended"], true);

    let chat = state
        .db
        .get_chat(body["chat_id"].as_str().unwrap(), "learner-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!chat.active);
}

#[tokio::test]
async fn test_string_end_flag_keeps_reply() {
    let (app, _state, model, token) = learner().await;
    model.push_reply(r#"{"response": "네, 있어요.", "end": "false"}"#);

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "go-shopping", "message": "사과 있어요?"}),
        ))
        .await
        .unwrap();

    let body = common::json_body(response).await;
    assert_eq!(body["response"], "네, 있어요.");
    assert_eq!(body["conversation_ended"], false);
}

#[tokio::test]
async fn test_model_failure_persists_nothing() {
    let (app, state, model, token) = learner().await;
    model.push_failure("OpenAI HTTP 500");

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "travel", "message": "안녕하세요"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(common::json_body(response).await["error"], "upstream_error");
    assert!(state
        .db
        .list_recent_chats("learner-1", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_review_failure_keeps_chat_open() {
    let (app, state, model, token) = learner().await;
    model.push_turn("네, 알겠어요.", false);
    model.push_turn("안녕히 가세요!", true);
    model.push_failure("timeout");

    let response = app
        .clone()
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "travel", "message": "서울역 어떻게 가요?"}),
        ))
        .await
        .unwrap();
    let chat_id = common::json_body(response).await["chat_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "travel", "message": "감사합니다", "chat_id": chat_id}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let chat = state
        .db
        .get_chat(&chat_id, "learner-1")
        .await
        .unwrap()
        .unwrap();
    assert!(chat.active);
    assert_eq!(state.db.list_messages(&chat_id).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unusable_review_output_uses_placeholders() {
    let (app, state, model, token) = learner().await;
    model.push_turn("다음에 또 만나요!", true);
    model.push_reply("no summary here");
    model.push_reply(r#"{"grammar_points": ["조사 '을/를'", "존댓말"]}"#);

    let response = app
        .oneshot(common::post_json(
            "/api/ai/chat",
            &token,
            json!({"situation": "talk-with-friends", "message": "이제 가야 돼"}),
        ))
        .await
        .unwrap();
    let body = common::json_body(response).await;
    assert_eq!(body["conversation_ended"], true);

    let chat = state
        .db
        .get_chat(body["chat_id"].as_str().unwrap(), "learner-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(chat.summary, SUMMARY_PLACEHOLDER);
    let feedback = chat.feedback.unwrap().0;
    assert_eq!(feedback.grammar_points, "조사 '을/를'\n존댓말");
    assert_eq!(feedback.study_tips, STUDY_TIPS_PLACEHOLDER);
    assert_ne!(feedback.grammar_points, GRAMMAR_PLACEHOLDER);
}

#[tokio::test]
async fn test_message_count_tracks_pairs() {
    let (app, _state, model, token) = learner().await;
    for _ in 0..3 {
        model.push_turn("네.", false);
    }

    let mut chat_id: Option<String> = None;
    for expected in 1..=3 {
        let mut payload = json!({"situation": "travel", "message": "한 번 더"});
        if let Some(id) = &chat_id {
            payload["chat_id"] = json!(id);
        }
        let response = app
            .clone()
            .oneshot(common::post_json("/api/ai/chat", &token, payload))
            .await
            .unwrap();
        let body = common::json_body(response).await;
        assert_eq!(body["message_count"], expected);
        chat_id = body["chat_id"].as_str().map(String::from);
    }
}
