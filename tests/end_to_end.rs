use chrono::{Duration, Utc};
use rsml_annotator::api::{ListUsersQuery, LoginRequest, RegisterRequest, SaveRequest};
use rsml_annotator::accounts::UserFilter;
use rsml_annotator::catalog::MemoryCatalog;
use rsml_annotator::user::AccountState;
use rsml_annotator::{Api, ErrorKind, Opts};

const SECRET: &[u8] = b"end-to-end-secret";

const CATALOG: &str = r#"{
    "batches": {
        "1": {
            "3": [
                {"id": "seg-a", "unsanitized_verbatim": "hello there", "audio_filepath": "1/3/a.wav"},
                {"id": "seg-b", "unsanitized_verbatim": "general kenobi", "rsml": "<spk>general</spk> kenobi"}
            ]
        }
    }
}"#;

async fn api_with_admin() -> anyhow::Result<(Api, String)> {
    let catalog = MemoryCatalog::from_json_reader(CATALOG.as_bytes())?;
    let api = Api::in_memory(SECRET, catalog, &Opts::default());
    api.accounts()
        .ensure_admin("Admin User", "admin@example.com", "admin-pass")
        .await?;
    let login = api
        .login(LoginRequest {
            email: "admin@example.com".to_owned(),
            password: "admin-pass".to_owned(),
        })
        .await?;
    Ok((api, login.token))
}

fn registration(email: &str) -> RegisterRequest {
    RegisterRequest {
        full_name: "Ada Annotator".to_owned(),
        email: email.to_owned(),
        password: "secret1".to_owned(),
        confirm_password: "secret1".to_owned(),
    }
}

fn login_as(email: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_owned(),
        password: "secret1".to_owned(),
    }
}

#[tokio::test]
async fn annotator_is_gated_until_approved_then_can_save() -> anyhow::Result<()> {
    let (api, admin) = api_with_admin().await?;

    let registered = api.register(registration("Ada@Example.com ")).await?;
    assert_eq!(registered.user.email, "ada@example.com");
    assert_eq!(registered.user.state, AccountState::Pending);

    let err = api.login(login_as("ada@example.com")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let pending = api.list_pending_users(Some(&admin)).await?;
    assert_eq!(pending.users.len(), 1);

    let id = registered.user.id.to_string();
    let approved = api.approve_user(Some(&admin), &id).await?;
    assert!(approved.user.is_approved);

    let token = api.login(login_as("ada@example.com")).await?.token;
    let me = api.get_self(Some(&token)).await?;
    assert_eq!(me.user.id, registered.user.id);

    assert_eq!(api.list_batches(Some(&token)).await?.max_batch, 1);
    assert_eq!(api.list_files(Some(&token), 1).await?.files, vec![3]);

    let segments = api.load_file(Some(&token), 1, 3).await?;
    assert_eq!(segments[0].markup, "hello there");
    assert_eq!(segments[0].audio_path.as_deref(), Some("/data/audio/1/3/a.wav"));
    assert_eq!(segments[1].markup, "<spk>general</spk> kenobi");

    let saved = api
        .save_segment(
            Some(&token),
            SaveRequest {
                id: "seg-a".to_owned(),
                markup: "<greet>hello</greet> there".to_owned(),
            },
        )
        .await?;
    assert_eq!(saved.id, "seg-a");

    let segments = api.load_file(Some(&token), 1, 3).await?;
    assert_eq!(segments[0].markup, "<greet>hello</greet> there");
    Ok(())
}

#[tokio::test]
async fn revocation_takes_effect_on_the_next_request() -> anyhow::Result<()> {
    let (api, admin) = api_with_admin().await?;
    let user = api.register(registration("bob@example.com")).await?.user;
    let id = user.id.to_string();
    api.approve_user(Some(&admin), &id).await?;
    let token = api.login(login_as("bob@example.com")).await?.token;
    api.list_batches(Some(&token)).await?;

    let revoked = api.revoke_user(Some(&admin), &id).await?;
    assert_eq!(revoked.user.state, AccountState::Revoked);

    let err = api.list_batches(Some(&token)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    api.approve_user(Some(&admin), &id).await?;
    api.list_batches(Some(&token)).await?;

    api.delete_user(Some(&admin), &id).await?;
    let err = api.list_batches(Some(&token)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
    Ok(())
}

#[tokio::test]
async fn expired_token_is_rejected_everywhere() -> anyhow::Result<()> {
    let (api, admin) = api_with_admin().await?;
    let admin_id = api.get_self(Some(&admin)).await?.user.id;
    let stale = api
        .access()
        .issue_credential_at(admin_id, Utc::now() - Duration::days(8))?;
    let stale = Some(stale.as_str());

    let kinds = [
        api.get_self(stale).await.map(|_| ()),
        api.list_pending_users(stale).await.map(|_| ()),
        api.list_all_users(stale, ListUsersQuery::default()).await.map(|_| ()),
        api.list_batches(stale).await.map(|_| ()),
        api.list_files(stale, 1).await.map(|_| ()),
        api.load_file(stale, 1, 3).await.map(|_| ()),
        api.save_segment(stale, SaveRequest::default()).await.map(|_| ()),
    ];
    for res in kinds {
        assert_eq!(res.unwrap_err().kind(), ErrorKind::Unauthorized);
    }
    Ok(())
}

#[tokio::test]
async fn admin_operations_refuse_annotators_and_admin_targets() -> anyhow::Result<()> {
    let (api, admin) = api_with_admin().await?;
    let admin_id = api.get_self(Some(&admin)).await?.user.id.to_string();

    let user = api.register(registration("cy@example.com")).await?.user;
    api.approve_user(Some(&admin), &user.id.to_string()).await?;
    let token = api.login(login_as("cy@example.com")).await?.token;

    let err = api.list_pending_users(Some(&token)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = api.approve_user(Some(&token), &admin_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let err = api.revoke_user(Some(&admin), &admin_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let err = api.reject_user(Some(&admin), &admin_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    api.get_self(Some(&admin)).await?;

    let err = api.approve_user(Some(&admin), "not-a-uuid").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[tokio::test]
async fn duplicate_registration_conflicts() -> anyhow::Result<()> {
    let (api, admin) = api_with_admin().await?;
    api.register(registration("dee@example.com")).await?;
    let err = api
        .register(registration("DEE@example.com"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let all = api
        .list_all_users(
            Some(&admin),
            ListUsersQuery {
                filter: UserFilter::All,
            },
        )
        .await?;
    assert_eq!(all.stats.total, 2);
    assert_eq!(all.stats.pending, 1);
    assert_eq!(all.stats.admins, 1);
    Ok(())
}
