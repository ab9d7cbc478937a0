//! Tagging engine tests against the scripted provider

use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use tagsweep::cloud::mock::MockCloud;
use tagsweep::cloud::ApiError;
use tagsweep::resource::tags::{decode, encode};
use tagsweep::resource::{
    parse_declared_tags, Catalog, Resource, Status, TagAction, TagWireShape, Tagger, Tags,
    GLOBAL_REGION,
};

const ACCOUNT: &str = "123456789012";

fn tagger(mock: &MockCloud) -> Tagger {
    Tagger::new(
        Arc::new(Catalog::builtin().unwrap().clone()),
        Arc::new(mock.clone()),
    )
}

fn resource(service: &str, resource_type: &str, region: &str, id: &str, arn: &str) -> Resource {
    Resource {
        account_id: ACCOUNT.to_string(),
        region: region.to_string(),
        service: service.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: id.to_string(),
        arn: arn.to_string(),
        name: id.to_string(),
        creation_date: String::new(),
        tags: Tags::new(),
        tags_number: 0,
        metadata: Map::new(),
    }
}

fn tags(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

mod bucket_tag_sets {
    use super::*;

    fn bucket(name: &str) -> Resource {
        resource("s3", "Bucket", GLOBAL_REGION, name, &format!("arn:aws:s3:::{}", name))
    }

    /// Scripted bucket whose tag set lives in shared state
    fn bucket_store(initial: Tags) -> (MockCloud, Arc<Mutex<Tags>>) {
        let state = Arc::new(Mutex::new(initial));
        let mock = MockCloud::new();

        let current = state.clone();
        mock.on("s3", "GetBucketTagging", move |_| {
            let tags = current.lock().unwrap();
            if tags.is_empty() {
                Err(ApiError::from_code("NoSuchTagSet", "The TagSet does not exist"))
            } else {
                Ok(json!({"TagSet": encode(&tags, TagWireShape::KvListUpper)}))
            }
        });

        let current = state.clone();
        mock.on("s3", "PutBucketTagging", move |params| {
            let written = decode(&params["Tagging"]["TagSet"], TagWireShape::KvListUpper)
                .map_err(|e| ApiError::from_code("MalformedXML", e.to_string()))?;
            *current.lock().unwrap() = written;
            Ok(Value::Null)
        });

        let current = state.clone();
        mock.on("s3", "DeleteBucketTagging", move |_| {
            current.lock().unwrap().clear();
            Ok(Value::Null)
        });

        (mock, state)
    }

    #[tokio::test]
    async fn test_apply_merges_with_existing_tags() {
        let (mock, state) = bucket_store(tags(&[("env", "dev")]));

        let outcomes = tagger(&mock)
            .tag(TagAction::Apply, &[bucket("logs")], &parse_declared_tags("owner:ada"))
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, Status::Success);
        assert_eq!(*state.lock().unwrap(), tags(&[("env", "dev"), ("owner", "ada")]));

        let puts = mock.calls_to("s3", "PutBucketTagging");
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].params["Bucket"], "logs");
        assert_eq!(puts[0].region, "us-east-1");
    }

    #[tokio::test]
    async fn test_remove_writes_difference_then_deletes_empty_set() {
        let (mock, state) = bucket_store(tags(&[("env", "dev"), ("owner", "ada")]));
        let tagger = tagger(&mock);
        let logs = [bucket("logs")];

        let outcomes = tagger
            .tag(TagAction::Remove, &logs, &parse_declared_tags("owner:"))
            .await;
        assert_eq!(outcomes[0].status, Status::Success);
        assert_eq!(*state.lock().unwrap(), tags(&[("env", "dev")]));
        assert!(mock.calls_to("s3", "DeleteBucketTagging").is_empty());

        let outcomes = tagger
            .tag(TagAction::Remove, &logs, &parse_declared_tags("env:"))
            .await;
        assert_eq!(outcomes[0].status, Status::Success);
        assert!(state.lock().unwrap().is_empty());
        assert_eq!(mock.calls_to("s3", "DeleteBucketTagging").len(), 1);
        assert_eq!(mock.calls_to("s3", "PutBucketTagging").len(), 1);
    }

    #[tokio::test]
    async fn test_apply_to_untagged_bucket_creates_set() {
        let (mock, state) = bucket_store(Tags::new());

        let outcomes = tagger(&mock)
            .tag(TagAction::Apply, &[bucket("assets")], &parse_declared_tags("team:web"))
            .await;

        assert_eq!(outcomes[0].status, Status::Success);
        assert_eq!(*state.lock().unwrap(), tags(&[("team", "web")]));
    }
}

mod argument_spellings {
    use super::*;

    fn key(id: &str) -> Resource {
        resource(
            "kms",
            "Key",
            "eu-west-1",
            id,
            &format!("arn:aws:kms:eu-west-1:{}:key/{}", ACCOUNT, id),
        )
    }

    #[tokio::test]
    async fn test_kms_uses_tag_key_shape_and_key_id() {
        let mock = MockCloud::new();
        mock.respond("kms", "TagResource", Value::Null);
        mock.respond("kms", "UntagResource", Value::Null);
        let tagger = tagger(&mock);
        let declared = parse_declared_tags("team:core");

        tagger.tag(TagAction::Apply, &[key("k-1")], &declared).await;
        tagger.tag(TagAction::Remove, &[key("k-1")], &declared).await;

        let apply = &mock.calls_to("kms", "TagResource")[0];
        assert_eq!(apply.params["KeyId"], "k-1");
        assert_eq!(apply.params["Tags"], json!([{"TagKey": "team", "TagValue": "core"}]));

        let remove = &mock.calls_to("kms", "UntagResource")[0];
        assert_eq!(remove.params["KeyId"], "k-1");
        assert_eq!(remove.params["TagKeys"], json!(["team"]));
    }

    #[tokio::test]
    async fn test_domain_remove_writes_empty_values() {
        let mock = MockCloud::new();
        mock.respond("route53domains", "UpdateTagsForDomain", json!({}));
        let domain = resource(
            "route53domains",
            "Domain",
            GLOBAL_REGION,
            "example.com",
            "arn:aws:route53domains:us-east-1:123456789012:domain/example.com",
        );

        let outcomes = tagger(&mock)
            .tag(TagAction::Remove, &[domain], &parse_declared_tags("owner:ada,env:prod"))
            .await;
        assert_eq!(outcomes[0].status, Status::Success);

        let calls = mock.calls_to("route53domains", "UpdateTagsForDomain");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].region, "us-east-1");
        assert_eq!(calls[0].params["DomainName"], "example.com");
        assert_eq!(
            calls[0].params["TagsToUpdate"],
            json!([{"Key": "env", "Value": ""}, {"Key": "owner", "Value": ""}])
        );
    }

    #[tokio::test]
    async fn test_instances_use_resource_lists_and_key_objects() {
        let mock = MockCloud::new();
        mock.respond("ec2", "CreateTags", Value::Null);
        mock.respond("ec2", "DeleteTags", Value::Null);
        let instance = resource(
            "ec2",
            "Instance",
            "eu-west-1",
            "i-0abc",
            "arn:aws:ec2:eu-west-1:123456789012:instance/i-0abc",
        );
        let tagger = tagger(&mock);
        let declared = parse_declared_tags("team:core");

        tagger.tag(TagAction::Apply, &[instance.clone()], &declared).await;
        tagger.tag(TagAction::Remove, &[instance], &declared).await;

        let create = &mock.calls_to("ec2", "CreateTags")[0];
        assert_eq!(create.params["Resources"], json!(["i-0abc"]));
        assert_eq!(create.params["Tags"], json!([{"Key": "team", "Value": "core"}]));

        let delete = &mock.calls_to("ec2", "DeleteTags")[0];
        assert_eq!(delete.params["Resources"], json!(["i-0abc"]));
        assert_eq!(delete.params["Tags"], json!([{"Key": "team"}]));
    }

    #[tokio::test]
    async fn test_hosted_zones_carry_resource_type() {
        let mock = MockCloud::new();
        mock.respond("route53", "ChangeTagsForResource", json!({}));
        let zone = resource(
            "route53",
            "HostedZone",
            GLOBAL_REGION,
            "Z123",
            "arn:aws:route53:::hostedzone/Z123",
        );

        tagger(&mock)
            .tag(TagAction::Apply, &[zone], &parse_declared_tags("env:prod"))
            .await;

        let call = &mock.calls_to("route53", "ChangeTagsForResource")[0];
        assert_eq!(call.params["ResourceId"], "Z123");
        assert_eq!(call.params["ResourceType"], "hostedzone");
        assert_eq!(call.params["AddTags"], json!([{"Key": "env", "Value": "prod"}]));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_one_failure_does_not_abort_the_batch() {
        let mock = MockCloud::new();
        mock.on("kms", "TagResource", |params| {
            if params["KeyId"] == "k-1" {
                Err(ApiError::from_code("AccessDeniedException", "not allowed"))
            } else {
                Ok(Value::Null)
            }
        });
        let keys: Vec<Resource> = ["k-1", "k-2", "k-3"]
            .iter()
            .map(|id| {
                resource(
                    "kms",
                    "Key",
                    "eu-west-1",
                    id,
                    &format!("arn:aws:kms:eu-west-1:{}:key/{}", ACCOUNT, id),
                )
            })
            .collect();

        let outcomes = tagger(&mock)
            .tag(TagAction::Apply, &keys, &parse_declared_tags("team:core"))
            .await;

        let statuses: Vec<Status> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![Status::Error, Status::Success, Status::Success]);
        assert_eq!(outcomes[0].error, "AccessDeniedException: not allowed");
        assert_eq!(outcomes[0].resource_id, "k-1");
        assert!(outcomes[1].error.is_empty());
        assert_eq!(mock.calls_to("kms", "TagResource").len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_adapter_is_reported_per_resource() {
        let mock = MockCloud::new();
        let odd = resource("ec2", "Teapot", "eu-west-1", "t-1", "arn:aws:ec2:eu-west-1::teapot/t-1");

        let outcomes = tagger(&mock)
            .tag(TagAction::Apply, &[odd], &parse_declared_tags("a:b"))
            .await;

        assert_eq!(outcomes[0].status, Status::Error);
        assert!(mock.calls().is_empty());
    }
}
