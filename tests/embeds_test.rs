mod common;

#[cfg(test)]
mod embeds_integration_tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use super::common::TestApp;

    #[tokio::test]
    async fn test_deleting_cta_strips_every_reference() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let news = app.category(&token, &page_id, "News").await;
        let rust = app.tag(&token, &page_id, "Rust").await;

        let mapped = app.cta(&token, &page_id, "Mapped", json!([news]), json!([rust])).await;
        let fallback = app.cta(&token, &page_id, "Fallback", json!(["global"]), json!([])).await;

        let page = app.page(&token, &page_id).await;
        assert_eq!(page["categoryCtaMapping"][&news], json!(mapped));
        assert_eq!(page["ctasConfig"]["tagMapping"][&rust], json!(mapped));
        assert_eq!(page["globalDefaultCtaId"], json!(fallback));

        let res = app
            .delete(&format!("/api/pages/{page_id}/ctas/{mapped}"), &token)
            .await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);

        let page = app.page(&token, &page_id).await;
        assert_eq!(page["categoryCtaMapping"], json!({}));
        assert_eq!(page["ctasConfig"]["tagMapping"], json!({}));
        assert_eq!(page["ctasConfig"]["ctas"].as_array().unwrap().len(), 1);

        app.delete(&format!("/api/pages/{page_id}/ctas/{fallback}"), &token)
            .await;
        let page = app.page(&token, &page_id).await;
        assert!(page["globalDefaultCtaId"].is_null());

        let missing = app
            .delete(&format!("/api/pages/{page_id}/ctas/{fallback}"), &token)
            .await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stale_revision_and_version_conflict() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let cta = app.cta(&token, &page_id, "First", json!([]), json!([])).await;
        app.cta(&token, &page_id, "Second", json!([]), json!([])).await;

        let stale = app
            .send(
                "PUT",
                &format!("/api/pages/{page_id}/ctas/{cta}"),
                Some(&token),
                Some(json!({"isActive": false})),
                &[("if-match", "1")],
            )
            .await;
        assert_eq!(stale.status, StatusCode::CONFLICT);

        let wrong_version = app
            .put(
                &format!("/api/pages/{page_id}/ctas/{cta}"),
                &token,
                json!({"isActive": false, "version": 7}),
            )
            .await;
        assert_eq!(wrong_version.status, StatusCode::CONFLICT);

        let fresh = app
            .send(
                "PUT",
                &format!("/api/pages/{page_id}/ctas/{cta}"),
                Some(&token),
                Some(json!({"isActive": false, "version": 1})),
                &[("if-match", "2")],
            )
            .await;
        assert_eq!(fresh.status, StatusCode::OK, "{}", fresh.body);
        assert_eq!(fresh.body["revision"], json!(3));
        assert_eq!(fresh.body["item"]["version"], json!(2));
        assert_eq!(fresh.headers["etag"], "3");
    }

    #[tokio::test]
    async fn test_table_sorting_and_stats() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let a = app.cta(&token, &page_id, "Alpha", json!([]), json!([])).await;
        app.cta(&token, &page_id, "Beta", json!([]), json!([])).await;
        app.cta(&token, &page_id, "Gamma", json!(["global"]), json!([])).await;

        let res = app
            .put(
                &format!("/api/pages/{page_id}/ctas/{a}"),
                &token,
                json!({"isActive": false}),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);

        let table = app
            .get(
                &format!("/api/pages/{page_id}/ctas?sortField=lastModified&sortDirection=asc"),
                &token,
            )
            .await;
        assert_eq!(table.status, StatusCode::OK, "{}", table.body);
        let names: Vec<_> = table.body["rows"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Beta", "Gamma", "Alpha"]);
        assert_eq!(table.body["stats"]["total"], json!(3));
        assert_eq!(table.body["stats"]["inactive"], json!(1));
        assert_eq!(table.body["stats"]["global"], json!(1));

        let bad = app
            .get(&format!("/api/pages/{page_id}/ctas?sortField=clicks"), &token)
            .await;
        assert_eq!(bad.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resolution_order() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let news = app.category(&token, &page_id, "News").await;
        let rust = app.tag(&token, &page_id, "Rust").await;

        let by_category = app.cta(&token, &page_id, "ByCategory", json!([news]), json!([])).await;
        app.cta(&token, &page_id, "ByTag", json!([]), json!([rust])).await;
        app.cta(&token, &page_id, "Fallback", json!(["global"]), json!([])).await;

        let post = app
            .post(
                &format!("/api/pages/{page_id}/posts"),
                &token,
                json!({"title": "Launch", "categories": [news], "tags": [rust]}),
            )
            .await;
        assert_eq!(post.status, StatusCode::CREATED, "{}", post.body);
        let post_id = post.body["id"].as_str().unwrap();

        let embeds = app.get(&format!("/api/posts/{post_id}/embeds"), &token).await;
        assert_eq!(embeds.body["cta"]["item"]["config"]["ctaName"], json!("ByCategory"));
        assert_eq!(embeds.body["cta"]["rule"], json!("category"));
        assert!(embeds.body["form"].is_null());

        let res = app
            .put(
                &format!("/api/pages/{page_id}/ctas/{by_category}"),
                &token,
                json!({"isActive": false}),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);

        let embeds = app.get(&format!("/api/posts/{post_id}/embeds"), &token).await;
        assert_eq!(embeds.body["cta"]["item"]["config"]["ctaName"], json!("ByTag"));
        assert_eq!(embeds.body["cta"]["matchedOn"], json!(rust));

        let preview = app.get(&format!("/api/pages/{page_id}/resolve"), &token).await;
        assert_eq!(preview.body["cta"]["item"]["config"]["ctaName"], json!("Fallback"));
        assert_eq!(preview.body["cta"]["rule"], json!("global"));
    }

    #[tokio::test]
    async fn test_deleting_category_cascades() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let news = app.category(&token, &page_id, "News").await;
        let cta = app.cta(&token, &page_id, "Mapped", json!([news]), json!([])).await;

        let form = app
            .post(
                &format!("/api/pages/{page_id}/forms"),
                &token,
                json!({"name": "Signup", "categoryId": news, "config": {
                    "fields": [{"name": "email", "label": "Email", "type": "email", "required": true}]
                }}),
            )
            .await;
        assert_eq!(form.status, StatusCode::CREATED, "{}", form.body);

        let post = app
            .post(
                &format!("/api/pages/{page_id}/posts"),
                &token,
                json!({"title": "Tagged", "categories": [news]}),
            )
            .await;
        let post_id = post.body["id"].as_str().unwrap().to_string();

        let res = app
            .delete(&format!("/api/pages/{page_id}/categories/{news}"), &token)
            .await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);

        let page = app.page(&token, &page_id).await;
        assert_eq!(page["categoryCtaMapping"], json!({}));
        assert_eq!(page["formsConfig"]["categoryMapping"], json!({}));
        assert!(page["formsConfig"]["forms"][0]["categoryId"].is_null());
        let stored = app.get(&format!("/api/pages/{page_id}/ctas/{cta}"), &token).await;
        assert_eq!(stored.body["config"]["categories"], json!([]));

        let post = app.get(&format!("/api/posts/{post_id}"), &token).await;
        assert_eq!(post.body["categories"], json!([]));

        let categories = app.get(&format!("/api/pages/{page_id}/categories"), &token).await;
        assert_eq!(categories.body, json!([]));
    }

    async fn signup_form(app: &TestApp, token: &str, page_id: &str, category: &str) -> String {
        let res = app
            .post(
                &format!("/api/pages/{page_id}/forms"),
                token,
                json!({"name": "Signup", "categoryId": category, "config": {
                    "fields": [{"name": "email", "label": "Email", "type": "email", "required": true}]
                }}),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "{}", res.body);
        res.body["item"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_form_global_default_keeps_category_mapping() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let news = app.category(&token, &page_id, "News").await;
        let form = signup_form(&app, &token, &page_id, &news).await;

        let res = app
            .put(
                &format!("/api/pages/{page_id}/forms/global-default"),
                &token,
                json!({"id": form}),
            )
            .await;
        assert_eq!(res.status, StatusCode::OK, "{}", res.body);
        assert_eq!(res.body["globalDefaultFormId"], json!(form));

        let page = app.page(&token, &page_id).await;
        let forms = &page["formsConfig"];
        assert_eq!(forms["globalDefaultFormId"], json!(form));
        assert_eq!(forms["categoryMapping"][&news], json!(form));
        assert_eq!(forms["forms"][0]["categoryId"], json!(news));
        assert_eq!(forms["forms"][0]["version"], json!(1));

        let cleared = app
            .put(
                &format!("/api/pages/{page_id}/forms/global-default"),
                &token,
                json!({"id": null}),
            )
            .await;
        assert_eq!(cleared.status, StatusCode::OK, "{}", cleared.body);
        let page = app.page(&token, &page_id).await;
        assert!(page["formsConfig"]["globalDefaultFormId"].is_null());
        assert_eq!(page["formsConfig"]["categoryMapping"][&news], json!(form));
    }

    #[tokio::test]
    async fn test_deleting_form_strips_every_reference() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let news = app.category(&token, &page_id, "News").await;
        let rust = app.tag(&token, &page_id, "Rust").await;
        let form = signup_form(&app, &token, &page_id, &news).await;

        let tagged = app
            .put(
                &format!("/api/pages/{page_id}/forms/mappings/tag"),
                &token,
                json!({"tagId": rust, "id": form}),
            )
            .await;
        assert_eq!(tagged.status, StatusCode::OK, "{}", tagged.body);
        let global = app
            .put(
                &format!("/api/pages/{page_id}/forms/global-default"),
                &token,
                json!({"id": form}),
            )
            .await;
        assert_eq!(global.status, StatusCode::OK, "{}", global.body);

        let page = app.page(&token, &page_id).await;
        assert_eq!(page["formsConfig"]["categoryMapping"][&news], json!(form));
        assert_eq!(page["formsConfig"]["tagMapping"][&rust], json!(form));
        assert_eq!(page["formsConfig"]["globalDefaultFormId"], json!(form));

        let res = app
            .delete(&format!("/api/pages/{page_id}/forms/{form}"), &token)
            .await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);

        let page = app.page(&token, &page_id).await;
        assert_eq!(page["formsConfig"]["forms"], json!([]));
        assert_eq!(page["formsConfig"]["categoryMapping"], json!({}));
        assert_eq!(page["formsConfig"]["tagMapping"], json!({}));
        assert!(page["formsConfig"]["globalDefaultFormId"].is_null());

        let missing = app
            .delete(&format!("/api/pages/{page_id}/forms/{form}"), &token)
            .await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_embed_writes_cannot_remap_deleted_category() {
        let app = TestApp::new();
        let token = app.register("owner@example.com").await;
        let page_id = app.workspace(&token, "acme").await;
        let news = app.category(&token, &page_id, "News").await;
        let cta = app.cta(&token, &page_id, "Mapped", json!([]), json!([])).await;
        let seen = app.page(&token, &page_id).await["revision"].to_string();

        let res = app
            .delete(&format!("/api/pages/{page_id}/categories/{news}"), &token)
            .await;
        assert_eq!(res.status, StatusCode::NO_CONTENT);

        // A writer holding the revision from before the delete loses on it.
        let stale = app
            .send(
                "PUT",
                &format!("/api/pages/{page_id}/ctas/mappings/category"),
                Some(&token),
                Some(json!({"categoryId": news, "id": cta})),
                &[("if-match", seen.as_str())],
            )
            .await;
        assert_eq!(stale.status, StatusCode::CONFLICT);

        let late = app
            .put(
                &format!("/api/pages/{page_id}/ctas/mappings/category"),
                &token,
                json!({"categoryId": news, "id": cta}),
            )
            .await;
        assert_eq!(late.status, StatusCode::BAD_REQUEST);

        let created = app
            .post(
                &format!("/api/pages/{page_id}/ctas"),
                &token,
                json!({"config": {
                    "ctaName": "Late",
                    "type": "banner",
                    "categories": [news],
                    "content": {"headline": "Late"}
                }}),
            )
            .await;
        assert_eq!(created.status, StatusCode::BAD_REQUEST);

        let page = app.page(&token, &page_id).await;
        assert_eq!(page["categoryCtaMapping"], json!({}));
    }
}
