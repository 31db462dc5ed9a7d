pub mod transport_layer_nack;
