//! 📜 The static schema definitions. One `static` per entity, built at compile time,
//! registered at startup, never mutated. Column names follow the state feeds
//! (`snake_case`); field names follow the persisted model (`camelCase`).

use crate::common::{FieldValue, Fields};
use crate::errors::FieldError;
use crate::schema::{
    DeletePolicy, DerivedField, EntityKind, EntitySchema, EnumVariant, FieldSpec, FieldType,
    Reference, Refinement,
};

/// 🏚️ Opportunities without a provider get this name, so the composite key stays non-null.
pub const UNKNOWN_PROVIDER_NAME: &str = "UNKNOWN PROVIDER";

const GENDERS: &[EnumVariant] = &[
    EnumVariant {
        name: "MALE",
        aliases: &["M", "Men"],
    },
    EnumVariant {
        name: "FEMALE",
        aliases: &["F", "Women"],
    },
    EnumVariant {
        name: "TRANS_MALE",
        aliases: &[],
    },
    EnumVariant {
        name: "TRANS_FEMALE",
        aliases: &[],
    },
    EnumVariant {
        name: "NON_BINARY",
        aliases: &[],
    },
    EnumVariant {
        name: "INTERNAL_UNKNOWN",
        aliases: &[],
    },
    EnumVariant {
        name: "EXTERNAL_UNKNOWN",
        aliases: &[],
    },
];

const REPORT_TYPES: &[EnumVariant] = &[
    EnumVariant {
        name: "FULL_PSI",
        aliases: &["PSI Assigned Full"],
    },
    EnumVariant {
        name: "FILE_REVIEW",
        aliases: &["PSI File Review Assigned"],
    },
    EnumVariant {
        name: "FILE_REVIEW_WITH_UPDATED_LSIR_SCORE",
        aliases: &["PSI File Review w/LSI Assigned"],
    },
];

const OPPORTUNITY_STATUSES: &[EnumVariant] = &[
    EnumVariant {
        name: "ACTIVE",
        aliases: &["Active"],
    },
    EnumVariant {
        name: "INACTIVE",
        aliases: &["Inactive"],
    },
];

// ============================================================
// 👮 Staff
// ============================================================

pub(crate) static STAFF: EntitySchema = EntitySchema {
    kind: EntityKind::Staff,
    fields: &[
        FieldSpec::required("externalId", "external_id", FieldType::Text),
        FieldSpec::required("pseudonymizedId", "pseudonymized_id", FieldType::Text),
        FieldSpec::required("stateCode", "state_code", FieldType::StateCode),
        FieldSpec::required("fullName", "full_name", FieldType::FullName),
        FieldSpec::required("email", "email", FieldType::Text),
        FieldSpec::optional("caseIds", "case_ids", FieldType::TextList).with_default("[]"),
        FieldSpec::optional("supervisorId", "supervisor_id", FieldType::Text),
    ],
    key: &["externalId"],
    partition_field: Some("stateCode"),
    references: &[],
    refinements: &[Refinement {
        name: "email looks like an email",
        check: email_has_at_sign,
    }],
    derived: &[],
    delete_policy: DeletePolicy::Prune,
};

// ============================================================
// 🧑 Client
// ============================================================

pub(crate) static CLIENT: EntitySchema = EntitySchema {
    kind: EntityKind::Client,
    fields: &[
        FieldSpec::required("externalId", "external_id", FieldType::Text),
        FieldSpec::required("pseudonymizedId", "pseudonymized_id", FieldType::Text),
        FieldSpec::required("stateCode", "state_code", FieldType::StateCode),
        FieldSpec::required("fullName", "full_name", FieldType::FullName),
        FieldSpec::optional("gender", "gender", FieldType::Enum(GENDERS))
            .with_default("INTERNAL_UNKNOWN"),
        FieldSpec::optional("county", "county", FieldType::Text).with_default("UNKNOWN"),
        FieldSpec::optional("district", "district", FieldType::Text),
        FieldSpec::required("birthDate", "birth_date", FieldType::Date),
        FieldSpec::optional("caseIds", "case_ids", FieldType::TextList).with_default("[]"),
    ],
    key: &["externalId"],
    partition_field: Some("stateCode"),
    references: &[],
    refinements: &[],
    derived: &[DerivedField {
        name: "isGenderLocked",
        compute: gender_is_known,
    }],
    delete_policy: DeletePolicy::Prune,
};

// ============================================================
// 📁 Case
// ============================================================

pub(crate) static CASE: EntitySchema = EntitySchema {
    kind: EntityKind::Case,
    fields: &[
        FieldSpec::required("externalId", "external_id", FieldType::Text),
        FieldSpec::required("stateCode", "state_code", FieldType::StateCode),
        FieldSpec::required("staffId", "staff_id", FieldType::Text),
        FieldSpec::required("clientId", "client_id", FieldType::Text),
        FieldSpec::optional("dueDate", "due_date", FieldType::Date),
        FieldSpec::optional("assignedDate", "assigned_date", FieldType::Date),
        FieldSpec::optional("completionDate", "completion_date", FieldType::Date),
        FieldSpec::optional("sentenceDate", "sentence_date", FieldType::Date),
        FieldSpec::optional("county", "county", FieldType::Text),
        FieldSpec::optional("district", "district", FieldType::Text),
        FieldSpec::optional("lsirScore", "lsir_score", FieldType::Integer),
        FieldSpec::optional("lsirLevel", "lsir_level", FieldType::Text),
        FieldSpec::optional("reportType", "report_type", FieldType::Enum(REPORT_TYPES)),
        FieldSpec::optional("investigationStatus", "investigation_status", FieldType::Text),
    ],
    key: &["externalId"],
    partition_field: Some("stateCode"),
    references: &[
        Reference {
            field: "staffId",
            entity: EntityKind::Staff,
        },
        Reference {
            field: "clientId",
            entity: EntityKind::Client,
        },
    ],
    refinements: &[
        Refinement {
            name: "lsir score is on the LSI-R scale",
            check: lsir_score_in_range,
        },
        Refinement {
            name: "completion does not precede assignment",
            check: completion_after_assignment,
        },
    ],
    derived: &[
        DerivedField {
            name: "isLsirScoreLocked",
            compute: lsir_score_present,
        },
        DerivedField {
            name: "isReportTypeLocked",
            compute: report_type_present,
        },
        DerivedField {
            name: "isCountyLocked",
            compute: county_present,
        },
    ],
    // -- 🧯 the case feed has been known to drop open cases. we warn, we don't delete.
    delete_policy: DeletePolicy::Retain,
};

// ============================================================
// ⚖️ Offense
// ============================================================

pub(crate) static OFFENSE: EntitySchema = EntitySchema {
    kind: EntityKind::Offense,
    fields: &[
        FieldSpec::required("name", "charge", FieldType::Text),
        FieldSpec::required("stateCode", "state_code", FieldType::StateCode),
        FieldSpec::optional("isSexOffense", "is_sex_offense", FieldType::Boolean),
        FieldSpec::optional("isViolentOffense", "is_violent", FieldType::Boolean),
        FieldSpec::optional("frequency", "frequency", FieldType::Integer),
    ],
    key: &["name"],
    partition_field: Some("stateCode"),
    references: &[],
    refinements: &[],
    derived: &[],
    delete_policy: DeletePolicy::Retain,
};

// ============================================================
// 🌱 Opportunity
// ============================================================

pub(crate) static OPPORTUNITY: EntitySchema = EntitySchema {
    kind: EntityKind::Opportunity,
    fields: &[
        FieldSpec::required("opportunityName", "OpportunityName", FieldType::Text),
        FieldSpec::optional("providerName", "ProviderName", FieldType::Text)
            .with_default(UNKNOWN_PROVIDER_NAME),
        FieldSpec::optional("description", "Description", FieldType::Text),
        FieldSpec::optional("providerPhoneNumber", "CleanedProviderPhoneNumber", FieldType::Text),
        FieldSpec::optional("providerWebsite", "ProviderWebsite", FieldType::Text),
        FieldSpec::optional("providerAddress", "ProviderAddress", FieldType::Text),
        FieldSpec::optional("totalCapacity", "CapacityTotal", FieldType::Integer),
        FieldSpec::optional("availableCapacity", "CapacityAvailable", FieldType::Integer),
        FieldSpec::optional("needsAddressed", "NeedsAddressed", FieldType::TextList)
            .with_default("[]"),
        FieldSpec::required(
            "developmentalDisabilityDiagnosisCriterion",
            "developmentalDisabilityDiagnosisCriterion",
            FieldType::Boolean,
        ),
        FieldSpec::required(
            "noCurrentOrPriorSexOffenseCriterion",
            "noCurrentOrPriorSexOffenseCriterion",
            FieldType::Boolean,
        ),
        FieldSpec::required(
            "noCurrentOrPriorViolentOffenseCriterion",
            "noCurrentOrPriorViolentOffenseCriterion",
            FieldType::Boolean,
        ),
        FieldSpec::required(
            "entryOfGuiltyPleaCriterion",
            "entryOfGuiltyPleaCriterion",
            FieldType::Boolean,
        ),
        FieldSpec::required(
            "veteranStatusCriterion",
            "veteranStatusCriterion",
            FieldType::Boolean,
        ),
        FieldSpec::optional(
            "minLsirScoreCriterion",
            "minLsirScoreCriterion",
            FieldType::Integer,
        ),
        FieldSpec::optional(
            "maxLsirScoreCriterion",
            "maxLsirScoreCriterion",
            FieldType::Integer,
        ),
        FieldSpec::optional("minAge", "minAge", FieldType::Integer),
        FieldSpec::optional("maxAge", "maxAge", FieldType::Integer),
        FieldSpec::optional("district", "district", FieldType::Text),
        FieldSpec::optional("counties", "counties", FieldType::TextList).with_default("[]"),
        FieldSpec::optional("genders", "genders", FieldType::TextList).with_default("[]"),
        FieldSpec::optional("additionalNotes", "additionalNotes", FieldType::Text),
        FieldSpec::optional("status", "status", FieldType::Enum(OPPORTUNITY_STATUSES))
            .with_default("ACTIVE"),
        FieldSpec::required("lastUpdatedAt", "lastUpdatedDate", FieldType::DateTime),
    ],
    key: &["opportunityName", "providerName"],
    partition_field: None,
    references: &[],
    refinements: &[
        Refinement {
            name: "age range is ordered",
            check: age_range_ordered,
        },
        Refinement {
            name: "lsir range is ordered",
            check: lsir_range_ordered,
        },
    ],
    derived: &[],
    delete_policy: DeletePolicy::Prune,
};

// ============================================================
// 📈 Insight
// ============================================================

/// 📈 The cohort a recidivism rate was rolled up over. Only the state is guaranteed.
const RECIDIVISM_ROLLUP: &[FieldSpec] = &[
    FieldSpec::required("stateCode", "state_code", FieldType::StateCode),
    FieldSpec::optional("gender", "gender", FieldType::Enum(GENDERS)),
    FieldSpec::optional(
        "assessmentScoreBucketStart",
        "assessment_score_bucket_start",
        FieldType::Integer,
    ),
    FieldSpec::optional(
        "assessmentScoreBucketEnd",
        "assessment_score_bucket_end",
        FieldType::Integer,
    ),
    FieldSpec::optional("mostSevereDescription", "most_severe_description", FieldType::Text),
    FieldSpec::optional("ncicCategory", "most_severe_ncic_category_uniform", FieldType::Text),
    FieldSpec::optional("combinedOffenseCategory", "combined_offense_category", FieldType::Text),
    FieldSpec::optional("violentOffense", "violent_offense", FieldType::Boolean),
];

/// 📉 One point on a recidivism curve.
const RECIDIVISM_POINT: &[FieldSpec] = &[
    FieldSpec::required("cohortMonths", "cohort_months", FieldType::Integer),
    FieldSpec::required("eventRate", "event_rate", FieldType::Float),
    FieldSpec::required("lowerCI", "lower_ci", FieldType::Float),
    FieldSpec::required("upperCI", "upper_ci", FieldType::Float),
];

pub(crate) static INSIGHT: EntitySchema = EntitySchema {
    kind: EntityKind::Insight,
    fields: &[
        FieldSpec::required("stateCode", "state_code", FieldType::StateCode),
        FieldSpec::required("gender", "gender", FieldType::Enum(GENDERS)),
        FieldSpec::required(
            "assessmentScoreBucketStart",
            "assessment_score_bucket_start",
            FieldType::Integer,
        ),
        FieldSpec::required(
            "assessmentScoreBucketEnd",
            "assessment_score_bucket_end",
            FieldType::Integer,
        ),
        FieldSpec::required("mostSevereDescription", "most_severe_description", FieldType::Text),
        FieldSpec::required(
            "recidivismRollup",
            "recidivism_rollup",
            FieldType::Object(RECIDIVISM_ROLLUP),
        ),
        FieldSpec::required("recidivismNumRecords", "recidivism_num_records", FieldType::Integer),
        FieldSpec::optional(
            "recidivismProbationSeries",
            "recidivism_probation_series",
            FieldType::ObjectList(RECIDIVISM_POINT),
        ),
        FieldSpec::optional(
            "recidivismRiderSeries",
            "recidivism_rider_series",
            FieldType::ObjectList(RECIDIVISM_POINT),
        ),
        FieldSpec::optional(
            "recidivismTermSeries",
            "recidivism_term_series",
            FieldType::ObjectList(RECIDIVISM_POINT),
        ),
        FieldSpec::required("dispositionNumRecords", "disposition_num_records", FieldType::Integer),
        FieldSpec::required("dispositionProbationPc", "disposition_probation_pc", FieldType::Float),
        FieldSpec::required("dispositionRiderPc", "disposition_rider_pc", FieldType::Float),
        FieldSpec::required("dispositionTermPc", "disposition_term_pc", FieldType::Float),
    ],
    key: &[
        "gender",
        "assessmentScoreBucketStart",
        "assessmentScoreBucketEnd",
        "mostSevereDescription",
    ],
    partition_field: Some("stateCode"),
    references: &[],
    refinements: &[
        Refinement {
            name: "probation share is a fraction",
            check: probation_share_is_fraction,
        },
        Refinement {
            name: "rider share is a fraction",
            check: rider_share_is_fraction,
        },
        Refinement {
            name: "term share is a fraction",
            check: term_share_is_fraction,
        },
    ],
    derived: &[],
    // -- nothing points at an insight, so a fresh upload replaces the lot
    delete_policy: DeletePolicy::Prune,
};

// ============================================================
// 🧮 Refinements and derived fields
// ============================================================

fn email_has_at_sign(fields: &Fields) -> Option<FieldError> {
    let email = fields.get("email")?.as_text()?;
    if email.contains('@') {
        None
    } else {
        Some(FieldError::new("email", format!("'{email}' is not an email address")))
    }
}

fn gender_is_known(fields: &Fields) -> FieldValue {
    let known = matches!(
        fields.get("gender").and_then(FieldValue::as_text),
        Some(g) if g != "INTERNAL_UNKNOWN" && g != "EXTERNAL_UNKNOWN"
    );
    FieldValue::Boolean(known)
}

fn present(fields: &Fields, name: &str) -> FieldValue {
    FieldValue::Boolean(fields.get(name).is_some_and(|v| !v.is_null()))
}

fn lsir_score_present(fields: &Fields) -> FieldValue {
    present(fields, "lsirScore")
}

fn report_type_present(fields: &Fields) -> FieldValue {
    present(fields, "reportType")
}

fn county_present(fields: &Fields) -> FieldValue {
    present(fields, "county")
}

/// 📏 The LSI-R tops out at 54. Anything above that came from a different instrument.
const LSIR_MAX: i64 = 54;

fn lsir_score_in_range(fields: &Fields) -> Option<FieldError> {
    let score = fields.get("lsirScore")?.as_integer()?;
    (!(0..=LSIR_MAX).contains(&score)).then(|| {
        FieldError::new("lsirScore", format!("{score} is outside the LSI-R range 0..={LSIR_MAX}"))
    })
}

fn completion_after_assignment(fields: &Fields) -> Option<FieldError> {
    let assigned = fields.get("assignedDate")?.as_date()?;
    let completed = fields.get("completionDate")?.as_date()?;
    (completed < assigned).then(|| {
        FieldError::new(
            "completionDate",
            format!("completion date {completed} is before assigned date {assigned}"),
        )
    })
}

fn ordered_range(fields: &Fields, min: &str, max: &str) -> Option<FieldError> {
    let low = fields.get(min)?.as_integer()?;
    let high = fields.get(max)?.as_integer()?;
    (low > high).then(|| FieldError::new(min, format!("{min} ({low}) is greater than {max} ({high})")))
}

fn age_range_ordered(fields: &Fields) -> Option<FieldError> {
    ordered_range(fields, "minAge", "maxAge")
}

fn lsir_range_ordered(fields: &Fields) -> Option<FieldError> {
    ordered_range(fields, "minLsirScoreCriterion", "maxLsirScoreCriterion")
}

/// 🥧 Disposition shares are fractions of the cohort, 0.0 through 1.0.
fn share_is_fraction(fields: &Fields, name: &str) -> Option<FieldError> {
    let share = fields.get(name)?.as_float()?;
    (!(0.0..=1.0).contains(&share))
        .then(|| FieldError::new(name, format!("{share} is not a share between 0 and 1")))
}

fn probation_share_is_fraction(fields: &Fields) -> Option<FieldError> {
    share_is_fraction(fields, "dispositionProbationPc")
}

fn rider_share_is_fraction(fields: &Fields) -> Option<FieldError> {
    share_is_fraction(fields, "dispositionRiderPc")
}

fn term_share_is_fraction(fields: &Fields) -> Option<FieldError> {
    share_is_fraction(fields, "dispositionTermPc")
}
