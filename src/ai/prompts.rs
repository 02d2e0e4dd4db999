//! Natural-language instructions sent to the model. The model is an opaque
//! collaborator; the handler never verifies that it followed the
//! instructions, it only requests them and normalizes whatever comes back.

use crate::entity::language_name;

pub fn translation(text: &str, source_language: &str, target_language: &str) -> String {
    format!(
        "Translate the following text from {source_language} to {target_language}.\n\
         Only return the translated text, nothing else.\n\n\
         Text to translate: \"{text}\""
    )
}

/// The reasoning is requested in the vendor's language and capped at two
/// short sentences; the handler does not verify the model complied.
pub fn price_suggestion(
    product_name: &str,
    quantity: f64,
    current_price: Option<f64>,
    location: &str,
    language: &str,
) -> String {
    let asking = current_price
        .map(|p| format!("₹{p}"))
        .unwrap_or_else(|| "Not specified".to_string());

    format!(
        "As a market analyst for Indian agricultural products, provide pricing \
         recommendations for the following:\n\n\
         Product: {product_name}\n\
         Quantity: {quantity} kg\n\
         Current asking price: {asking}\n\
         Location: {location}\n\n\
         Please provide:\n\
         1. Minimum fair price per kg\n\
         2. Maximum reasonable price per kg\n\
         3. Recommended selling price per kg\n\
         4. Brief reasoning, written in {lang_name}, at most two short sentences\n\
         5. Market trend (rising/falling/stable)\n\n\
         Format your response as JSON:\n\
         {{\n\
           \"min_price\": number,\n\
           \"max_price\": number,\n\
           \"recommended_price\": number,\n\
           \"reasoning\": \"string\",\n\
           \"market_trend\": \"rising|falling|stable\"\n\
         }}",
        lang_name = language_name(language),
    )
}

/// `history` is the preformatted `sender: text` transcript, one line per
/// message.
pub fn negotiation(
    product_name: &str,
    product_price: f64,
    product_quantity: f64,
    history: &str,
    buyer_message: &str,
    vendor_language: &str,
) -> String {
    format!(
        "You are helping a vendor in an Indian marketplace negotiate with a buyer.\n\n\
         Product: {product_name} (₹{product_price}/kg, {product_quantity}kg available)\n\
         Conversation so far:\n\
         {history}\n\n\
         Latest buyer message: \"{buyer_message}\"\n\n\
         Generate 3 professional, culturally appropriate responses for the vendor in {lang_name}.\n\
         The responses should be:\n\
         1. Friendly and professional\n\
         2. Aimed at closing the deal\n\
         3. Respectful of Indian business culture\n\n\
         Format as JSON:\n\
         {{\n\
           \"suggestions\": [\"response1\", \"response2\", \"response3\"],\n\
           \"tone\": \"friendly|professional|firm\"\n\
         }}",
        lang_name = language_name(vendor_language),
    )
}
